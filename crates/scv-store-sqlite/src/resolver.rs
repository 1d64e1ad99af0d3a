//! Schema-adaptive ledger reads.
//!
//! The match-decision, evidence-artefact, and audit tables are written by
//! external processes, and deployments differ in which tables, optional
//! columns, and linkage columns exist. Rather than branching on column
//! presence per call, each table's live shape is discovered once and
//! compiled into an immutable query plan: a select list with `NULL`
//! literals standing in for absent optional columns, plus (for audit) a
//! tagged linkage variant. Plans are held in a [`SchemaCache`], lazily
//! populated and manually invalidatable; a live schema change otherwise
//! requires a process restart.

use std::sync::Mutex;

use rusqlite::{types::Value as SqlValue, OptionalExtension as _};
use scv_core::ledger::{AuditEvent, EvidenceArtefact, MatchDecision};

use crate::encode::{dt_of, f64_of, json_of, text_of};

/// Audit table names probed in order; the first that exists wins.
const AUDIT_TABLES: &[&str] = &[
  "audit_events",
  "audit_trail",
  "audit_log",
  "audit_logs",
  "audit_entries",
  "audit_entry",
];

/// Evidence table names probed in order.
const EVIDENCE_TABLES: &[&str] = &["evidence_artefacts", "evidence_artifacts"];

// ─── Shape discovery ─────────────────────────────────────────────────────────

/// The column names of `table`, or `None` if the table does not exist.
fn table_columns(
  conn: &rusqlite::Connection,
  table: &str,
) -> rusqlite::Result<Option<Vec<String>>> {
  let exists: bool = conn
    .query_row(
      "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
      rusqlite::params![table],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false);
  if !exists {
    return Ok(None);
  }

  let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
  let cols = stmt
    .query_map(rusqlite::params![table], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(Some(cols))
}

fn has(cols: &[String], name: &str) -> bool {
  cols.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// The first of `aliases` present in `cols`, by its actual spelling.
fn pick<'a>(cols: &'a [String], aliases: &[&str]) -> Option<&'a str> {
  aliases.iter().find_map(|alias| {
    cols
      .iter()
      .find(|c| c.eq_ignore_ascii_case(alias))
      .map(String::as_str)
  })
}

/// One select-list entry yielding `canonical`: the live column (aliased if
/// spelled differently) or a `NULL` literal when no alias exists.
fn select_as(cols: &[String], aliases: &[&str], canonical: &str) -> String {
  match pick(cols, aliases) {
    Some(actual) if actual == canonical => format!("\"{actual}\""),
    Some(actual) => format!("\"{actual}\" AS {canonical}"),
    None => format!("NULL AS {canonical}"),
  }
}

// ─── Match plan ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct MatchPlan {
  select_sql: String,
}

impl MatchPlan {
  /// Compile a plan against the live `match_decisions` shape. A missing
  /// table, or one lacking the required key columns, yields no plan.
  fn discover(
    conn: &rusqlite::Connection,
  ) -> rusqlite::Result<Option<MatchPlan>> {
    let Some(cols) = table_columns(conn, "match_decisions")? else {
      return Ok(None);
    };
    let required =
      ["match_decision_id", "source_record_id", "matched_client_id", "decision"];
    if required.iter().any(|&c| !has(&cols, c)) {
      return Ok(None);
    }

    let select_list = [
      select_as(&cols, &["match_decision_id"], "match_decision_id"),
      select_as(&cols, &["match_run_id", "run_id"], "match_run_id"),
      select_as(&cols, &["source_record_id"], "source_record_id"),
      select_as(&cols, &["matched_client_id"], "matched_client_id"),
      select_as(&cols, &["decision"], "decision"),
      select_as(&cols, &["decided_at", "created_at"], "decided_at"),
      select_as(&cols, &["source_system", "system"], "source_system"),
      select_as(&cols, &["confidence", "score"], "confidence"),
    ]
    .join(", ");

    let order = if has(&cols, "decided_at") {
      "ORDER BY decided_at DESC"
    } else {
      "ORDER BY rowid DESC"
    };

    let select_sql = format!(
      "SELECT {select_list} FROM match_decisions \
       WHERE matched_client_id = ?1 {order} LIMIT ?2"
    );
    tracing::debug!(sql = %select_sql, "compiled match-history plan");
    Ok(Some(MatchPlan { select_sql }))
  }
}

// ─── Evidence plan ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct EvidencePlan {
  table:       String,
  select_list: String,
  order:       &'static str,
}

impl EvidencePlan {
  fn discover(
    conn: &rusqlite::Connection,
  ) -> rusqlite::Result<Option<EvidencePlan>> {
    for &table in EVIDENCE_TABLES {
      let Some(cols) = table_columns(conn, table)? else { continue };
      // Without a content payload there is no client linkage at all.
      if !has(&cols, "content") {
        continue;
      }

      let select_list = [
        select_as(&cols, &["artefact_id", "artifact_id", "id"], "artefact_id"),
        select_as(
          &cols,
          &["evidence_bundle_id", "bundle_id"],
          "evidence_bundle_id",
        ),
        select_as(&cols, &["artefact_type", "artifact_type"], "artefact_type"),
        select_as(&cols, &["created_at"], "created_at"),
        select_as(&cols, &["content"], "content"),
      ]
      .join(", ");

      let order = if has(&cols, "created_at") {
        "ORDER BY created_at DESC"
      } else {
        "ORDER BY rowid DESC"
      };

      tracing::debug!(table, "compiled evidence plan");
      return Ok(Some(EvidencePlan {
        table: table.to_string(),
        select_list,
        order,
      }));
    }
    Ok(None)
  }
}

// ─── Audit plan ──────────────────────────────────────────────────────────────

/// How the live audit table links rows to a client. Strategies are probed
/// in priority order and exactly one is used per table shape.
#[derive(Debug, Clone)]
enum AuditLinkage {
  /// Direct `client_id` column.
  ClientId,
  /// `matched_client_id` column.
  MatchedClientId,
  /// `entity_id` holding either the raw id or a `client:<id>` composite.
  EntityId,
  /// `source_record_id` joined through the match-decision ledger.
  SourceRecordJoin,
  /// JSON `details`-class column tested for `$.client_id` containment.
  DetailsJson(String),
}

#[derive(Debug, Clone)]
struct AuditPlan {
  table:       String,
  select_list: String,
  order:       String,
  linkage:     Option<AuditLinkage>,
}

impl AuditPlan {
  /// Compile a plan against the first audit table that exists. A table
  /// with no recognised linkage column still gets a plan — with no
  /// linkage, so reads yield empty lists rather than errors.
  fn discover(
    conn: &rusqlite::Connection,
    match_ledger_present: bool,
  ) -> rusqlite::Result<Option<AuditPlan>> {
    for &table in AUDIT_TABLES {
      let Some(cols) = table_columns(conn, table)? else { continue };

      let details_col = pick(&cols, &["details", "content", "payload", "metadata"])
        .map(str::to_owned);

      let linkage = if has(&cols, "client_id") {
        Some(AuditLinkage::ClientId)
      } else if has(&cols, "matched_client_id") {
        Some(AuditLinkage::MatchedClientId)
      } else if has(&cols, "entity_id") {
        Some(AuditLinkage::EntityId)
      } else if has(&cols, "source_record_id") && match_ledger_present {
        Some(AuditLinkage::SourceRecordJoin)
      } else {
        details_col.clone().map(AuditLinkage::DetailsJson)
      };

      let select_list = [
        select_as(&cols, &["id", "audit_id", "event_id"], "id"),
        select_as(
          &cols,
          &["occurred_at", "timestamp", "created_at"],
          "occurred_at",
        ),
        select_as(&cols, &["event_type", "type", "action"], "event_type"),
        select_as(&cols, &["actor", "user", "created_by"], "actor"),
        select_as(
          &cols,
          &["details", "content", "payload", "metadata"],
          "details",
        ),
      ]
      .join(", ");

      let order = match pick(&cols, &["occurred_at", "timestamp", "created_at"])
      {
        Some(ts) => format!("ORDER BY \"{ts}\" DESC"),
        None => "ORDER BY rowid DESC".to_string(),
      };

      tracing::debug!(table, linkage = ?linkage, "compiled audit plan");
      return Ok(Some(AuditPlan {
        table: table.to_string(),
        select_list,
        order,
        linkage,
      }));
    }
    Ok(None)
  }

  /// The WHERE clause for this plan's linkage, with `?1` = client id.
  fn where_clause(&self) -> Option<String> {
    let clause = match self.linkage.as_ref()? {
      AuditLinkage::ClientId => "client_id = ?1".to_string(),
      AuditLinkage::MatchedClientId => "matched_client_id = ?1".to_string(),
      AuditLinkage::EntityId => {
        "(entity_id = ?1 OR entity_id = 'client:' || ?1)".to_string()
      }
      AuditLinkage::SourceRecordJoin => "source_record_id IN (\
         SELECT DISTINCT source_record_id FROM match_decisions \
         WHERE matched_client_id = ?1)"
        .to_string(),
      AuditLinkage::DetailsJson(col) => format!(
        "(json_valid(\"{col}\") \
         AND CAST(json_extract(\"{col}\", '$.client_id') AS TEXT) = ?1)"
      ),
    };
    Some(clause)
  }
}

// ─── SchemaCache ─────────────────────────────────────────────────────────────

/// Cached query plans for the three ledger tables.
///
/// Lifecycle: lazily populated on first use of each read, then reused for
/// the life of the process. [`SchemaCache::invalidate`] drops all plans so
/// the next read rediscovers — tests use this after DDL changes.
///
/// The outer `Option` distinguishes "not yet discovered" from the inner
/// "discovered: table absent".
#[derive(Debug, Default)]
pub struct SchemaCache {
  match_plan:    Mutex<Option<Option<MatchPlan>>>,
  evidence_plan: Mutex<Option<Option<EvidencePlan>>>,
  audit_plan:    Mutex<Option<Option<AuditPlan>>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  match m.lock() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  }
}

impl SchemaCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Drop all cached plans; the next read re-runs discovery.
  pub fn invalidate(&self) {
    *lock(&self.match_plan) = None;
    *lock(&self.evidence_plan) = None;
    *lock(&self.audit_plan) = None;
  }

  fn match_plan(
    &self,
    conn: &rusqlite::Connection,
  ) -> rusqlite::Result<Option<MatchPlan>> {
    let mut slot = lock(&self.match_plan);
    if slot.is_none() {
      *slot = Some(MatchPlan::discover(conn)?);
    }
    Ok(slot.as_ref().and_then(Clone::clone))
  }

  fn evidence_plan(
    &self,
    conn: &rusqlite::Connection,
  ) -> rusqlite::Result<Option<EvidencePlan>> {
    let mut slot = lock(&self.evidence_plan);
    if slot.is_none() {
      *slot = Some(EvidencePlan::discover(conn)?);
    }
    Ok(slot.as_ref().and_then(Clone::clone))
  }

  fn audit_plan(
    &self,
    conn: &rusqlite::Connection,
  ) -> rusqlite::Result<Option<AuditPlan>> {
    let match_ledger_present = self.match_plan(conn)?.is_some();
    let mut slot = lock(&self.audit_plan);
    if slot.is_none() {
      *slot = Some(AuditPlan::discover(conn, match_ledger_present)?);
    }
    Ok(slot.as_ref().and_then(Clone::clone))
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Match decisions for `client_id`, newest first. Missing table or
  /// unusable shape yields an empty list.
  pub(crate) fn fetch_match_history(
    &self,
    conn: &rusqlite::Connection,
    client_id: &str,
    limit: i64,
  ) -> rusqlite::Result<Vec<MatchDecision>> {
    let Some(plan) = self.match_plan(conn)? else {
      return Ok(Vec::new());
    };

    let mut stmt = conn.prepare(&plan.select_sql)?;
    let rows = stmt
      .query_map(rusqlite::params![client_id, limit], |row| {
        let col = |i: usize| row.get::<_, SqlValue>(i);
        Ok(MatchDecision {
          match_decision_id: text_of(&col(0)?).unwrap_or_default(),
          match_run_id:      text_of(&col(1)?),
          source_record_id:  text_of(&col(2)?).unwrap_or_default(),
          matched_client_id: text_of(&col(3)?).unwrap_or_default(),
          decision:          text_of(&col(4)?).unwrap_or_default(),
          decided_at:        dt_of(&col(5)?),
          source_system:     text_of(&col(6)?),
          confidence:        f64_of(&col(7)?),
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
  }

  /// The distinct source record ids matched to `client_id`.
  pub(crate) fn client_record_ids(
    &self,
    conn: &rusqlite::Connection,
    client_id: &str,
  ) -> rusqlite::Result<Vec<String>> {
    if self.match_plan(conn)?.is_none() {
      return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
      "SELECT DISTINCT source_record_id FROM match_decisions \
       WHERE matched_client_id = ?1",
    )?;
    let ids = stmt
      .query_map(rusqlite::params![client_id], |row| row.get::<_, String>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
  }

  /// Evidence artefacts whose `content.source_record_ids` intersects
  /// `record_ids`. Callers pass the client's matched record ids; an empty
  /// set short-circuits without touching the table.
  pub(crate) fn fetch_evidence(
    &self,
    conn: &rusqlite::Connection,
    record_ids: &[String],
    limit: i64,
  ) -> rusqlite::Result<Vec<EvidenceArtefact>> {
    if record_ids.is_empty() {
      return Ok(Vec::new());
    }
    let Some(plan) = self.evidence_plan(conn)? else {
      return Ok(Vec::new());
    };

    let placeholders = (1..=record_ids.len())
      .map(|i| format!("?{i}"))
      .collect::<Vec<_>>()
      .join(", ");
    let sql = format!(
      "SELECT {select} FROM \"{table}\" \
       WHERE json_valid(content) AND EXISTS (\
         SELECT 1 FROM json_each(\"{table}\".content, '$.source_record_ids') linked \
         WHERE linked.value IN ({placeholders})) \
       {order} LIMIT ?{limit_idx}",
      select = plan.select_list,
      table = plan.table,
      order = plan.order,
      limit_idx = record_ids.len() + 1,
    );

    let params = record_ids
      .iter()
      .map(|id| SqlValue::Text(id.clone()))
      .chain(std::iter::once(SqlValue::Integer(limit)));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
      .query_map(rusqlite::params_from_iter(params), |row| {
        let col = |i: usize| row.get::<_, SqlValue>(i);
        Ok(EvidenceArtefact {
          artefact_id:        text_of(&col(0)?).unwrap_or_default(),
          evidence_bundle_id: text_of(&col(1)?),
          artefact_type:      text_of(&col(2)?),
          created_at:         dt_of(&col(3)?),
          content:            json_of(&col(4)?),
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
  }

  /// Audit events linked to `client_id` via the plan's linkage. A table
  /// with no usable linkage, or no table at all, yields an empty list.
  pub(crate) fn fetch_audit(
    &self,
    conn: &rusqlite::Connection,
    client_id: &str,
    limit: i64,
  ) -> rusqlite::Result<Vec<AuditEvent>> {
    let Some(plan) = self.audit_plan(conn)? else {
      return Ok(Vec::new());
    };
    let Some(where_clause) = plan.where_clause() else {
      return Ok(Vec::new());
    };

    let sql = format!(
      "SELECT {select} FROM \"{table}\" WHERE {where_clause} {order} LIMIT ?2",
      select = plan.select_list,
      table = plan.table,
      order = plan.order,
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
      .query_map(rusqlite::params![client_id, limit], |row| {
        let col = |i: usize| row.get::<_, SqlValue>(i);
        let details = match json_of(&col(4)?) {
          serde_json::Value::Null => None,
          value => Some(value),
        };
        Ok(AuditEvent {
          id: text_of(&col(0)?),
          occurred_at: dt_of(&col(1)?),
          event_type: text_of(&col(2)?),
          actor: text_of(&col(3)?),
          details,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
  }
}
