//! The full profile-read payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  ledger::{AuditEvent, EvidenceArtefact, MatchDecision},
  profile::ClientProfile,
};

/// The computed read model for a client — never stored, always derived.
///
/// Every top-level key is present even when empty; omitting one is a
/// contract violation for consumers. The profile's own fields flatten into
/// the top level of the serialised form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientView {
  #[serde(flatten)]
  pub profile: ClientProfile,

  pub match_decisions: Vec<MatchDecision>,

  /// Collaborator data (trade/transaction history) composed by an
  /// out-of-scope outer service. Carried here so the key is always
  /// present in the contract shape.
  pub trade_history: Vec<Value>,

  pub audit_trail: Vec<AuditEvent>,

  pub evidence_artefacts: Vec<EvidenceArtefact>,
}
