//! Read-only ledger rows: match decisions, evidence artefacts, and audit
//! events.
//!
//! These are produced by out-of-scope matching and evidence-generation
//! processes; this core only ever reads them. Deployments differ in which
//! optional columns exist, so optional columns are `Option` here and the
//! resolver substitutes `NULL` where the live schema lacks them — the
//! output shape is stable everywhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── MatchDecision ───────────────────────────────────────────────────────────

/// An append-only ledger entry linking a raw source record to a canonical
/// client id. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDecision {
  pub match_decision_id: String,
  pub match_run_id:      Option<String>,
  pub source_record_id:  String,
  pub matched_client_id: String,
  pub decision:          String,
  pub decided_at:        Option<DateTime<Utc>>,
  /// Optional column; absent in some deployments.
  pub source_system:     Option<String>,
  /// Optional column; absent in some deployments.
  pub confidence:        Option<f64>,
}

// ─── EvidenceArtefact ────────────────────────────────────────────────────────

/// A stored object substantiating a match or derived value.
///
/// There is no direct foreign key to a client: linkage is derived
/// transitively through the set of `source_record_ids` embedded in
/// `content`, intersected with the client's match decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceArtefact {
  pub artefact_id:        String,
  pub evidence_bundle_id: Option<String>,
  pub artefact_type:      Option<String>,
  pub created_at:         Option<DateTime<Utc>>,
  pub content:            Value,
}

impl EvidenceArtefact {
  /// The source record ids this artefact substantiates, read from
  /// `content.source_record_ids`. Missing or malformed entries yield an
  /// empty list.
  pub fn source_record_ids(&self) -> Vec<&str> {
    match self.content.get("source_record_ids") {
      Some(Value::Array(ids)) => {
        ids.iter().filter_map(Value::as_str).collect()
      }
      _ => Vec::new(),
    }
  }
}

// ─── AuditEvent ──────────────────────────────────────────────────────────────

/// An audit-trail entry, aliased into a stable shape regardless of which
/// of the known audit-table layouts the deployment uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
  pub id:          Option<String>,
  pub occurred_at: Option<DateTime<Utc>>,
  pub event_type:  Option<String>,
  pub actor:       Option<String>,
  pub details:     Option<Value>,
}
