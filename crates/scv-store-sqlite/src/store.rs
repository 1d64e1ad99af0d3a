//! [`SqliteStore`] — the SQLite implementation of [`ProfileStore`].

use std::{path::Path, sync::Arc};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use scv_core::{
  ingest::IngestionReport,
  ledger::{AuditEvent, EvidenceArtefact, MatchDecision},
  precedence::SourcePrecedence,
  profile::assemble,
  record::{RawRecord, SourceRecord},
  store::ProfileStore,
  view::ClientView,
};

use crate::{
  encode::{encode_attributes, encode_dt, RawRecordRow},
  resolver::SchemaCache,
  schema::SCHEMA,
  Error, Result,
};

/// Ledger row limits applied by `materialize`; full-depth reads go through
/// the individual ledger methods.
const MATCH_HISTORY_LIMIT: usize = 25;
const EVIDENCE_LIMIT: usize = 50;
const AUDIT_LIMIT: usize = 100;

const RAW_RECORD_COLUMNS: &str =
  "source_system, source_record_id, attributes, ingested_at, updated_at";

/// One candidate ready for the upsert statement, encoded ahead of the
/// connection call.
struct PreparedUpsert {
  record_id:        String,
  source_system:    String,
  source_record_id: String,
  attributes:       String,
  at:               String,
}

fn raw_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecordRow> {
  Ok(RawRecordRow {
    source_system:    row.get(0)?,
    source_record_id: row.get(1)?,
    attributes:       row.get(2)?,
    ingested_at:      row.get(3)?,
    updated_at:       row.get(4)?,
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An SCV profile store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted and clones
/// share the same schema cache.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  precedence:      SourcePrecedence,
  schema:          Arc<SchemaCache>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::from_conn(conn).await
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::from_conn(conn).await
  }

  async fn from_conn(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let store = Self {
      conn,
      precedence: SourcePrecedence::default(),
      schema: Arc::new(SchemaCache::new()),
    };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the merge-order policy used when assembling profiles.
  pub fn with_precedence(mut self, precedence: SourcePrecedence) -> Self {
    self.precedence = precedence;
    self
  }

  /// The ledger query-plan cache. Exposed so operators (and tests) can
  /// force rediscovery after an external schema change.
  pub fn schema_cache(&self) -> &SchemaCache {
    &self.schema
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── ProfileStore impl ───────────────────────────────────────────────────────

impl ProfileStore for SqliteStore {
  type Error = Error;

  // ── Ingestion ─────────────────────────────────────────────────────────────

  async fn ingest(
    &self,
    records: Vec<SourceRecord>,
  ) -> Result<IngestionReport> {
    let total = records.len();
    let mut skipped = 0;
    let mut prepared = Vec::with_capacity(total);

    for record in &records {
      let Some((system, id)) = record.natural_key() else {
        skipped += 1;
        continue;
      };
      prepared.push(PreparedUpsert {
        record_id:        Uuid::new_v4().hyphenated().to_string(),
        source_system:    system.to_owned(),
        source_record_id: id.to_owned(),
        attributes:       encode_attributes(&record.attributes)?,
        at:               encode_dt(Utc::now()),
      });
    }

    let (inserted, updated) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0;
        let mut updated = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO raw_records (
               record_id, source_system, source_record_id,
               attributes, ingested_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (source_system, source_record_id)
             DO UPDATE SET
               attributes = excluded.attributes,
               updated_at = excluded.updated_at
             RETURNING ingested_at, updated_at",
          )?;
          for p in prepared {
            // Equal timestamps mean the row was inserted by this upsert;
            // an update moves updated_at past the original ingested_at.
            let (ingested_at, updated_at): (String, String) = stmt.query_row(
              rusqlite::params![
                p.record_id,
                p.source_system,
                p.source_record_id,
                p.attributes,
                p.at,
              ],
              |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            if ingested_at == updated_at {
              inserted += 1;
            } else {
              updated += 1;
            }
          }
        }
        tx.commit()?;
        Ok((inserted, updated))
      })
      .await?;

    let report = IngestionReport { total, inserted, updated, skipped };
    tracing::info!(
      total = report.total,
      inserted = report.inserted,
      updated = report.updated,
      skipped = report.skipped,
      "ingested batch"
    );
    Ok(report)
  }

  async fn get_raw_record(
    &self,
    source_system: &str,
    source_record_id: &str,
  ) -> Result<Option<RawRecord>> {
    let system = source_system.to_owned();
    let id = source_record_id.to_owned();

    let row: Option<RawRecordRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {RAW_RECORD_COLUMNS} FROM raw_records
                 WHERE source_system = ?1 AND source_record_id = ?2"
              ),
              rusqlite::params![system, id],
              raw_record_row,
            )
            .optional()?,
        )
      })
      .await?;

    row.map(RawRecordRow::into_record).transpose()
  }

  async fn list_raw_records(
    &self,
    source_system: Option<&str>,
    limit: usize,
  ) -> Result<Vec<RawRecord>> {
    let system = source_system.map(str::to_owned);
    let limit = limit as i64;

    let rows: Vec<RawRecordRow> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(system) = system {
          let mut stmt = conn.prepare(&format!(
            "SELECT {RAW_RECORD_COLUMNS} FROM raw_records
             WHERE source_system = ?1
             ORDER BY ingested_at DESC, source_record_id LIMIT ?2"
          ))?;
          stmt
            .query_map(rusqlite::params![system, limit], raw_record_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!(
            "SELECT {RAW_RECORD_COLUMNS} FROM raw_records
             ORDER BY ingested_at DESC, source_record_id LIMIT ?1"
          ))?;
          stmt
            .query_map(rusqlite::params![limit], raw_record_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    rows.into_iter().map(RawRecordRow::into_record).collect()
  }

  async fn raw_record_count(&self) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM raw_records", [], |row| {
          row.get(0)
        })?)
      })
      .await?;
    Ok(count as u64)
  }

  // ── Clients ───────────────────────────────────────────────────────────────

  async fn add_client(&self, client_id: &str) -> Result<()> {
    let id = client_id.to_owned();
    let at = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO clients (client_id, created_at)
           VALUES (?1, ?2)",
          rusqlite::params![id, at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn client_exists(&self, client_id: &str) -> Result<bool> {
    let id = client_id.to_owned();

    let exists: bool = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM clients WHERE client_id = ?1",
              rusqlite::params![id],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(exists)
  }

  async fn raw_records_for_client(
    &self,
    client_id: &str,
  ) -> Result<Vec<RawRecord>> {
    let id = client_id.to_owned();
    let cache = Arc::clone(&self.schema);

    let rows: Vec<RawRecordRow> = self
      .conn
      .call(move |conn| {
        let record_ids = cache.client_record_ids(conn, &id)?;
        if record_ids.is_empty() {
          return Ok(Vec::new());
        }

        let placeholders = (1..=record_ids.len())
          .map(|i| format!("?{i}"))
          .collect::<Vec<_>>()
          .join(", ");
        let mut stmt = conn.prepare(&format!(
          "SELECT {RAW_RECORD_COLUMNS} FROM raw_records
           WHERE source_record_id IN ({placeholders})"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(record_ids), raw_record_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    // Best-effort read: an undecodable stored payload drops out of
    // assembly instead of failing the profile.
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
      match row.into_record() {
        Ok(record) => records.push(record),
        Err(e) => {
          tracing::warn!(error = %e, "excluding undecodable raw record");
        }
      }
    }

    self.precedence.sort(&mut records);
    Ok(records)
  }

  // ── Ledger reads ──────────────────────────────────────────────────────────

  async fn match_history(
    &self,
    client_id: &str,
    limit: usize,
  ) -> Result<Vec<MatchDecision>> {
    let id = client_id.to_owned();
    let cache = Arc::clone(&self.schema);

    let rows = self
      .conn
      .call(move |conn| Ok(cache.fetch_match_history(conn, &id, limit as i64)?))
      .await?;
    Ok(rows)
  }

  async fn evidence_artefacts(
    &self,
    client_id: &str,
    limit: usize,
  ) -> Result<Vec<EvidenceArtefact>> {
    let id = client_id.to_owned();
    let cache = Arc::clone(&self.schema);

    let rows = self
      .conn
      .call(move |conn| {
        let record_ids = cache.client_record_ids(conn, &id)?;
        Ok(cache.fetch_evidence(conn, &record_ids, limit as i64)?)
      })
      .await?;
    Ok(rows)
  }

  async fn audit_trail(
    &self,
    client_id: &str,
    limit: usize,
  ) -> Result<Vec<AuditEvent>> {
    let id = client_id.to_owned();
    let cache = Arc::clone(&self.schema);

    let rows = self
      .conn
      .call(move |conn| Ok(cache.fetch_audit(conn, &id, limit as i64)?))
      .await?;
    Ok(rows)
  }

  // ── Profile read ──────────────────────────────────────────────────────────

  async fn materialize(&self, client_id: &str) -> Result<ClientView> {
    if !self.client_exists(client_id).await? {
      return Err(Error::ClientNotFound(client_id.to_owned()));
    }

    let records = self.raw_records_for_client(client_id).await?;
    let profile = assemble(client_id, &records);

    let match_decisions =
      self.match_history(client_id, MATCH_HISTORY_LIMIT).await?;
    let evidence_artefacts =
      self.evidence_artefacts(client_id, EVIDENCE_LIMIT).await?;
    let audit_trail = self.audit_trail(client_id, AUDIT_LIMIT).await?;

    Ok(ClientView {
      profile,
      match_decisions,
      trade_history: Vec::new(),
      audit_trail,
      evidence_artefacts,
    })
  }
}
