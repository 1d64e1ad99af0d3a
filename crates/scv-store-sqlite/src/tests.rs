//! Integration tests for `SqliteStore` against an in-memory database.
//!
//! The ledger tables (match decisions, evidence artefacts, audit) are
//! created by external processes in production, so tests create them here
//! with raw DDL — deliberately in several variant shapes, since the
//! resolver must adapt to whatever layout a deployment actually has.

use scv_core::{
  precedence::SourcePrecedence,
  record::{Attributes, SourceRecord},
  store::ProfileStore,
};
use serde_json::{json, Value};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// Run raw SQL against the store's connection, bypassing the store API.
/// Used to stand up ledger tables and to inject pathological rows.
async fn exec(s: &SqliteStore, sql: &str) {
  let sql = sql.to_string();
  s.conn
    .call(move |conn| {
      conn.execute_batch(&sql)?;
      Ok(())
    })
    .await
    .expect("raw SQL");
}

fn candidate(system: &str, id: &str, attrs: Value) -> SourceRecord {
  let Value::Object(attributes) = attrs else {
    panic!("attrs must be an object")
  };
  SourceRecord {
    source_system:    Some(system.to_string()),
    source_record_id: Some(id.to_string()),
    attributes,
  }
}

const MATCH_DDL: &str = "
  CREATE TABLE match_decisions (
    match_decision_id TEXT PRIMARY KEY,
    match_run_id      TEXT,
    source_record_id  TEXT NOT NULL,
    matched_client_id TEXT NOT NULL,
    decision          TEXT NOT NULL,
    decided_at        TEXT,
    source_system     TEXT,
    confidence        REAL
  );
";

const EVIDENCE_DDL: &str = "
  CREATE TABLE evidence_artefacts (
    artefact_id        TEXT PRIMARY KEY,
    evidence_bundle_id TEXT,
    artefact_type      TEXT,
    created_at         TEXT,
    content            TEXT
  );
";

// ─── Ingestion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_record_inserts_then_rerun_updates() {
  let s = store().await;
  let batch =
    vec![candidate("CRM", "1", json!({ "first_name": "Alice" }))];

  let report = s.ingest(batch.clone()).await.unwrap();
  assert_eq!(
    (report.total, report.inserted, report.updated, report.skipped),
    (1, 1, 0, 0)
  );

  let report = s.ingest(batch).await.unwrap();
  assert_eq!(
    (report.total, report.inserted, report.updated, report.skipped),
    (1, 0, 1, 0)
  );
}

#[tokio::test]
async fn reingesting_a_batch_is_idempotent() {
  let s = store().await;
  let batch = vec![
    candidate("crm", "1", json!({ "name": "Alice" })),
    candidate("crm", "2", json!({ "name": "Bob" })),
    candidate("kyc", "1", json!({ "name": "Alice L" })),
  ];

  let first = s.ingest(batch.clone()).await.unwrap();
  assert_eq!(first.inserted, 3);
  assert_eq!(first.updated, 0);

  let second = s.ingest(batch).await.unwrap();
  assert_eq!(second.inserted, 0);
  assert_eq!(second.updated, 3);

  assert_eq!(s.raw_record_count().await.unwrap(), 3);
}

#[tokio::test]
async fn update_overwrites_attributes_in_place() {
  let s = store().await;
  s.ingest(vec![candidate("crm", "1", json!({ "email": "old@x.com" }))])
    .await
    .unwrap();
  s.ingest(vec![candidate("crm", "1", json!({ "email": "new@x.com" }))])
    .await
    .unwrap();

  assert_eq!(s.raw_record_count().await.unwrap(), 1);

  let record = s.get_raw_record("crm", "1").await.unwrap().unwrap();
  assert_eq!(record.text_attr("email"), Some("new@x.com"));
  assert!(record.updated_at > record.ingested_at);
}

#[tokio::test]
async fn records_missing_natural_key_are_skipped() {
  let s = store().await;
  let batch = vec![
    candidate("crm", "1", json!({ "name": "kept" })),
    SourceRecord {
      source_system:    None,
      source_record_id: Some("2".into()),
      attributes:       Attributes::new(),
    },
    SourceRecord {
      source_system:    Some("crm".into()),
      source_record_id: Some("   ".into()),
      attributes:       Attributes::new(),
    },
  ];

  let report = s.ingest(batch).await.unwrap();
  assert_eq!(
    (report.total, report.inserted, report.updated, report.skipped),
    (3, 1, 0, 2)
  );
  assert_eq!(s.raw_record_count().await.unwrap(), 1);
}

#[tokio::test]
async fn feed_batches_flow_through_ingest() {
  let s = store().await;
  let input = "source_system,source_record_id,first_name,last_name,email\n\
               CRM,1,Alice,Liddell,alice@example.com\n\
               KYC,2,Bob,Stone,bob@example.com\n\
               ,,orphan,row,missing@keys.com\n";

  let records = scv_feed::parse_records(input).unwrap();
  let report = s.ingest(records).await.unwrap();

  assert_eq!(
    (report.total, report.inserted, report.updated, report.skipped),
    (3, 2, 0, 1)
  );

  let record = s.get_raw_record("CRM", "1").await.unwrap().unwrap();
  assert_eq!(record.text_attr("first_name"), Some("Alice"));
}

#[tokio::test]
async fn get_raw_record_missing_returns_none() {
  let s = store().await;
  assert!(s.get_raw_record("crm", "nope").await.unwrap().is_none());
}

#[tokio::test]
async fn list_raw_records_filters_and_limits() {
  let s = store().await;
  s.ingest(vec![
    candidate("crm", "1", json!({})),
    candidate("crm", "2", json!({})),
    candidate("kyc", "1", json!({})),
  ])
  .await
  .unwrap();

  let crm = s.list_raw_records(Some("crm"), 10).await.unwrap();
  assert_eq!(crm.len(), 2);
  assert!(crm.iter().all(|r| r.source_system == "crm"));

  let all = s.list_raw_records(None, 2).await.unwrap();
  assert_eq!(all.len(), 2);
}

// ─── Clients & profile read ──────────────────────────────────────────────────

#[tokio::test]
async fn add_client_is_idempotent() {
  let s = store().await;
  assert!(!s.client_exists("c1").await.unwrap());

  s.add_client("c1").await.unwrap();
  s.add_client("c1").await.unwrap();
  assert!(s.client_exists("c1").await.unwrap());
}

#[tokio::test]
async fn materialize_unknown_client_errors() {
  let s = store().await;
  let err = s.materialize("ghost").await.unwrap_err();
  assert!(matches!(err, Error::ClientNotFound(id) if id == "ghost"));
}

#[tokio::test]
async fn materialize_without_ledger_tables_is_empty_not_an_error() {
  let s = store().await;
  s.add_client("c1").await.unwrap();

  let view = s.materialize("c1").await.unwrap();
  assert_eq!(view.profile.name, None);
  assert!(view.profile.raw_sources.is_empty());
  assert!(view.match_decisions.is_empty());
  assert!(view.trade_history.is_empty());
  assert!(view.audit_trail.is_empty());
  assert!(view.evidence_artefacts.is_empty());
}

#[tokio::test]
async fn materialize_assembles_from_matched_records() {
  let s = store().await;
  s.add_client("c1").await.unwrap();
  s.ingest(vec![
    candidate(
      "crm",
      "r-crm",
      json!({
        "name": "Alice",
        "email": "a@x.com",
        "identifier": "CRM-123",
        "address": { "line1": "1 High St", "city": "London" }
      }),
    ),
    candidate(
      "kyc",
      "r-kyc",
      json!({ "name": "Alice K", "phone": "+44 20 7000 1001" }),
    ),
  ])
  .await
  .unwrap();

  exec(&s, MATCH_DDL).await;
  exec(
    &s,
    "INSERT INTO match_decisions VALUES
       ('md1', 'run1', 'r-crm', 'c1', 'accepted',
        '2024-06-01T10:00:00+00:00', 'crm', 0.95),
       ('md2', 'run1', 'r-kyc', 'c1', 'accepted',
        '2024-06-01T10:01:00+00:00', 'kyc', 0.80),
       ('md3', 'run1', 'r-other', 'c2', 'accepted',
        '2024-06-01T10:02:00+00:00', NULL, NULL);",
  )
  .await;

  let view = s.materialize("c1").await.unwrap();

  // CRM outranks KYC, so CRM wins the shared scalar fields.
  assert_eq!(view.profile.name.as_deref(), Some("Alice"));
  assert_eq!(view.profile.lineage["name"].as_deref(), Some("crm"));
  assert_eq!(view.profile.phone.as_deref(), Some("+44 20 7000 1001"));
  assert_eq!(view.profile.lineage["phone"].as_deref(), Some("kyc"));

  assert_eq!(view.profile.identifiers.len(), 1);
  assert_eq!(view.profile.identifiers[0].value, "CRM-123");
  assert_eq!(view.profile.addresses.len(), 1);
  assert_eq!(view.profile.raw_sources.len(), 2);

  // Only c1's decisions, newest first.
  assert_eq!(view.match_decisions.len(), 2);
  assert_eq!(view.match_decisions[0].match_decision_id, "md2");
  assert_eq!(view.match_decisions[1].confidence, Some(0.95));
}

#[tokio::test]
async fn custom_precedence_reorders_field_wins() {
  let s = store()
    .await
    .with_precedence(SourcePrecedence::new(["kyc", "crm"]));
  s.add_client("c1").await.unwrap();
  s.ingest(vec![
    candidate("crm", "r-crm", json!({ "name": "Alice" })),
    candidate("kyc", "r-kyc", json!({ "name": "Alice K" })),
  ])
  .await
  .unwrap();

  exec(&s, MATCH_DDL).await;
  exec(
    &s,
    "INSERT INTO match_decisions
       (match_decision_id, source_record_id, matched_client_id, decision)
     VALUES ('md1', 'r-crm', 'c1', 'accepted'),
            ('md2', 'r-kyc', 'c1', 'accepted');",
  )
  .await;

  let view = s.materialize("c1").await.unwrap();
  assert_eq!(view.profile.name.as_deref(), Some("Alice K"));
  assert_eq!(view.profile.lineage["name"].as_deref(), Some("kyc"));
}

#[tokio::test]
async fn corrupt_stored_attributes_drop_out_of_assembly() {
  let s = store().await;
  s.add_client("c1").await.unwrap();
  s.ingest(vec![candidate("crm", "r-good", json!({ "name": "Alice" }))])
    .await
    .unwrap();
  // Inject a row whose attribute payload is not valid JSON.
  exec(
    &s,
    "INSERT INTO raw_records VALUES
       ('bad-row', 'kyc', 'r-bad', 'not json at all',
        '2024-06-01T09:00:00+00:00', '2024-06-01T09:00:00+00:00');",
  )
  .await;

  exec(&s, MATCH_DDL).await;
  exec(
    &s,
    "INSERT INTO match_decisions
       (match_decision_id, source_record_id, matched_client_id, decision)
     VALUES ('md1', 'r-good', 'c1', 'accepted'),
            ('md2', 'r-bad', 'c1', 'accepted');",
  )
  .await;

  let records = s.raw_records_for_client("c1").await.unwrap();
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].source_record_id, "r-good");

  let view = s.materialize("c1").await.unwrap();
  assert_eq!(view.profile.name.as_deref(), Some("Alice"));
}

// ─── Match history ───────────────────────────────────────────────────────────

#[tokio::test]
async fn match_history_is_newest_first_and_limited() {
  let s = store().await;
  exec(&s, MATCH_DDL).await;
  exec(
    &s,
    "INSERT INTO match_decisions VALUES
       ('md1', NULL, 'r1', 'c1', 'accepted',
        '2024-06-01T10:00:00+00:00', NULL, NULL),
       ('md2', NULL, 'r2', 'c1', 'rejected',
        '2024-06-02T10:00:00+00:00', NULL, NULL),
       ('md3', NULL, 'r3', 'c1', 'accepted',
        '2024-06-03T10:00:00+00:00', NULL, NULL);",
  )
  .await;

  let history = s.match_history("c1", 2).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].match_decision_id, "md3");
  assert_eq!(history[1].match_decision_id, "md2");
  assert_eq!(history[1].decision, "rejected");
}

#[tokio::test]
async fn match_history_substitutes_null_for_absent_columns() {
  let s = store().await;
  // A deployment carrying only the required columns.
  exec(
    &s,
    "CREATE TABLE match_decisions (
       match_decision_id TEXT PRIMARY KEY,
       source_record_id  TEXT NOT NULL,
       matched_client_id TEXT NOT NULL,
       decision          TEXT NOT NULL
     );
     INSERT INTO match_decisions VALUES ('md1', 'r1', 'c1', 'accepted');",
  )
  .await;

  let history = s.match_history("c1", 10).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].match_decision_id, "md1");
  assert_eq!(history[0].match_run_id, None);
  assert_eq!(history[0].decided_at, None);
  assert_eq!(history[0].source_system, None);
  assert_eq!(history[0].confidence, None);
}

#[tokio::test]
async fn match_history_aliases_legacy_system_column() {
  let s = store().await;
  exec(
    &s,
    "CREATE TABLE match_decisions (
       match_decision_id TEXT PRIMARY KEY,
       source_record_id  TEXT NOT NULL,
       matched_client_id TEXT NOT NULL,
       decision          TEXT NOT NULL,
       system            TEXT
     );
     INSERT INTO match_decisions VALUES ('md1', 'r1', 'c1', 'accepted', 'crm');",
  )
  .await;

  let history = s.match_history("c1", 10).await.unwrap();
  assert_eq!(history[0].source_system.as_deref(), Some("crm"));
}

#[tokio::test]
async fn match_history_missing_table_is_empty() {
  let s = store().await;
  assert!(s.match_history("c1", 10).await.unwrap().is_empty());
}

// ─── Evidence artefacts ──────────────────────────────────────────────────────

#[tokio::test]
async fn client_without_decisions_gets_empty_history_and_evidence() {
  let s = store().await;
  exec(&s, MATCH_DDL).await;
  exec(&s, EVIDENCE_DDL).await;
  // An artefact exists but nothing links c1 to any source record.
  exec(
    &s,
    "INSERT INTO evidence_artefacts VALUES
       ('a1', NULL, 'document', '2024-06-01T10:00:00+00:00',
        '{\"source_record_ids\": [\"r1\"]}');",
  )
  .await;

  assert!(s.match_history("c1", 10).await.unwrap().is_empty());
  assert!(s.evidence_artefacts("c1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn evidence_intersects_matched_record_ids() {
  let s = store().await;
  exec(&s, MATCH_DDL).await;
  exec(&s, EVIDENCE_DDL).await;
  exec(
    &s,
    "INSERT INTO match_decisions
       (match_decision_id, source_record_id, matched_client_id, decision)
     VALUES ('md1', 'r1', 'c1', 'accepted');
     INSERT INTO evidence_artefacts VALUES
       ('a1', 'b1', 'document', '2024-06-01T10:00:00+00:00',
        '{\"source_record_ids\": [\"r1\", \"r9\"]}'),
       ('a2', 'b1', 'document', '2024-06-02T10:00:00+00:00',
        '{\"source_record_ids\": [\"r9\"]}');",
  )
  .await;

  let artefacts = s.evidence_artefacts("c1", 10).await.unwrap();
  assert_eq!(artefacts.len(), 1);
  assert_eq!(artefacts[0].artefact_id, "a1");
  assert_eq!(artefacts[0].evidence_bundle_id.as_deref(), Some("b1"));
  assert_eq!(artefacts[0].source_record_ids(), ["r1", "r9"]);
}

#[tokio::test]
async fn evidence_with_invalid_json_content_is_skipped() {
  let s = store().await;
  exec(&s, MATCH_DDL).await;
  exec(&s, EVIDENCE_DDL).await;
  exec(
    &s,
    "INSERT INTO match_decisions
       (match_decision_id, source_record_id, matched_client_id, decision)
     VALUES ('md1', 'r1', 'c1', 'accepted');
     INSERT INTO evidence_artefacts VALUES
       ('a1', NULL, NULL, NULL, 'not json {'),
       ('a2', NULL, NULL, NULL, '{\"source_record_ids\": [\"r1\"]}');",
  )
  .await;

  let artefacts = s.evidence_artefacts("c1", 10).await.unwrap();
  assert_eq!(artefacts.len(), 1);
  assert_eq!(artefacts[0].artefact_id, "a2");
}

#[tokio::test]
async fn evidence_missing_table_is_empty() {
  let s = store().await;
  exec(&s, MATCH_DDL).await;
  exec(
    &s,
    "INSERT INTO match_decisions
       (match_decision_id, source_record_id, matched_client_id, decision)
     VALUES ('md1', 'r1', 'c1', 'accepted');",
  )
  .await;

  assert!(s.evidence_artefacts("c1", 10).await.unwrap().is_empty());
}

// ─── Audit trail ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn audit_links_by_direct_client_id_column() {
  let s = store().await;
  exec(
    &s,
    "CREATE TABLE audit_events (
       id          TEXT PRIMARY KEY,
       occurred_at TEXT,
       event_type  TEXT,
       actor       TEXT,
       details     TEXT,
       client_id   TEXT
     );
     INSERT INTO audit_events VALUES
       ('e1', '2024-06-01T10:00:00+00:00', 'profile_viewed', 'ops',
        '{\"note\": \"x\"}', 'c1'),
       ('e2', '2024-06-02T10:00:00+00:00', 'profile_viewed', 'ops',
        NULL, 'c2');",
  )
  .await;

  let trail = s.audit_trail("c1", 10).await.unwrap();
  assert_eq!(trail.len(), 1);
  assert_eq!(trail[0].id.as_deref(), Some("e1"));
  assert_eq!(trail[0].event_type.as_deref(), Some("profile_viewed"));
  assert_eq!(trail[0].details, Some(json!({ "note": "x" })));
}

#[tokio::test]
async fn audit_links_by_matched_client_id_column() {
  let s = store().await;
  exec(
    &s,
    "CREATE TABLE audit_events (
       id                TEXT PRIMARY KEY,
       occurred_at       TEXT,
       event_type        TEXT,
       matched_client_id TEXT
     );
     INSERT INTO audit_events VALUES
       ('e1', '2024-06-01T10:00:00+00:00', 'match_recorded', 'c1');",
  )
  .await;

  let trail = s.audit_trail("c1", 10).await.unwrap();
  assert_eq!(trail.len(), 1);
  assert_eq!(trail[0].actor, None);
  assert_eq!(trail[0].details, None);
}

#[tokio::test]
async fn audit_entity_id_matches_raw_and_composite_keys() {
  let s = store().await;
  exec(
    &s,
    "CREATE TABLE audit_events (
       id          TEXT PRIMARY KEY,
       occurred_at TEXT,
       event_type  TEXT,
       entity_id   TEXT
     );
     INSERT INTO audit_events VALUES
       ('e1', '2024-06-01T10:00:00+00:00', 'created', 'c1'),
       ('e2', '2024-06-02T10:00:00+00:00', 'updated', 'client:c1'),
       ('e3', '2024-06-03T10:00:00+00:00', 'created', 'account:c1');",
  )
  .await;

  let trail = s.audit_trail("c1", 10).await.unwrap();
  assert_eq!(trail.len(), 2);
  assert_eq!(trail[0].id.as_deref(), Some("e2"));
  assert_eq!(trail[1].id.as_deref(), Some("e1"));
}

#[tokio::test]
async fn audit_joins_through_match_decisions_by_source_record() {
  let s = store().await;
  exec(&s, MATCH_DDL).await;
  exec(
    &s,
    "INSERT INTO match_decisions
       (match_decision_id, source_record_id, matched_client_id, decision)
     VALUES ('md1', 'r1', 'c1', 'accepted');
     CREATE TABLE audit_events (
       id               TEXT PRIMARY KEY,
       occurred_at      TEXT,
       event_type       TEXT,
       source_record_id TEXT
     );
     INSERT INTO audit_events VALUES
       ('e1', '2024-06-01T10:00:00+00:00', 'record_ingested', 'r1'),
       ('e2', '2024-06-02T10:00:00+00:00', 'record_ingested', 'r9');",
  )
  .await;

  let trail = s.audit_trail("c1", 10).await.unwrap();
  assert_eq!(trail.len(), 1);
  assert_eq!(trail[0].id.as_deref(), Some("e1"));
}

#[tokio::test]
async fn audit_falls_back_to_details_json_containment() {
  let s = store().await;
  exec(
    &s,
    "CREATE TABLE audit_events (
       id          TEXT PRIMARY KEY,
       occurred_at TEXT,
       event_type  TEXT,
       details     TEXT
     );
     INSERT INTO audit_events VALUES
       ('e1', '2024-06-01T10:00:00+00:00', 'flag_raised',
        '{\"client_id\": \"c1\", \"flag\": \"pep\"}'),
       ('e2', '2024-06-02T10:00:00+00:00', 'flag_raised',
        '{\"client_id\": \"c2\"}'),
       ('e3', '2024-06-03T10:00:00+00:00', 'flag_raised', 'not json');",
  )
  .await;

  let trail = s.audit_trail("c1", 10).await.unwrap();
  assert_eq!(trail.len(), 1);
  assert_eq!(trail[0].id.as_deref(), Some("e1"));
  assert_eq!(
    trail[0].details,
    Some(json!({ "client_id": "c1", "flag": "pep" }))
  );
}

#[tokio::test]
async fn audit_prefers_client_id_over_other_linkages() {
  let s = store().await;
  // Both linkage columns exist; only the direct client_id one may be used.
  exec(
    &s,
    "CREATE TABLE audit_events (
       id          TEXT PRIMARY KEY,
       occurred_at TEXT,
       client_id   TEXT,
       entity_id   TEXT
     );
     INSERT INTO audit_events VALUES
       ('e1', '2024-06-01T10:00:00+00:00', 'c1', 'other'),
       ('e2', '2024-06-02T10:00:00+00:00', 'c9', 'client:c1');",
  )
  .await;

  let trail = s.audit_trail("c1", 10).await.unwrap();
  assert_eq!(trail.len(), 1);
  assert_eq!(trail[0].id.as_deref(), Some("e1"));
}

#[tokio::test]
async fn audit_adapts_to_aliased_legacy_layout() {
  let s = store().await;
  // A legacy deployment: different table name and column spellings.
  exec(
    &s,
    "CREATE TABLE audit_log (
       audit_id  TEXT PRIMARY KEY,
       timestamp TEXT,
       action    TEXT,
       user      TEXT,
       payload   TEXT,
       client_id TEXT
     );
     INSERT INTO audit_log VALUES
       ('e1', '2024-06-01 10:00:00', 'kyc_check', 'analyst',
        '{\"result\": \"pass\"}', 'c1');",
  )
  .await;

  let trail = s.audit_trail("c1", 10).await.unwrap();
  assert_eq!(trail.len(), 1);
  assert_eq!(trail[0].id.as_deref(), Some("e1"));
  assert_eq!(trail[0].event_type.as_deref(), Some("kyc_check"));
  assert_eq!(trail[0].actor.as_deref(), Some("analyst"));
  assert!(trail[0].occurred_at.is_some());
  assert_eq!(trail[0].details, Some(json!({ "result": "pass" })));
}

#[tokio::test]
async fn audit_missing_table_is_empty() {
  let s = store().await;
  assert!(s.audit_trail("c1", 10).await.unwrap().is_empty());
}

// ─── Schema cache lifecycle ──────────────────────────────────────────────────

#[tokio::test]
async fn cached_plans_survive_ddl_until_invalidated() {
  let s = store().await;

  // First read discovers "no audit table" and caches that.
  assert!(s.audit_trail("c1", 10).await.unwrap().is_empty());

  exec(
    &s,
    "CREATE TABLE audit_events (
       id          TEXT PRIMARY KEY,
       occurred_at TEXT,
       client_id   TEXT
     );
     INSERT INTO audit_events VALUES
       ('e1', '2024-06-01T10:00:00+00:00', 'c1');",
  )
  .await;

  // Still empty: the cache has no invalidation on its own.
  assert!(s.audit_trail("c1", 10).await.unwrap().is_empty());

  s.schema_cache().invalidate();
  let trail = s.audit_trail("c1", 10).await.unwrap();
  assert_eq!(trail.len(), 1);
}
