//! The `ProfileStore` trait.
//!
//! Implemented by storage backends (e.g. `scv-store-sqlite`). Callers
//! depend on this abstraction, not on any concrete backend. All methods
//! return `Send` futures so the trait can be used in multi-threaded async
//! runtimes.

use std::future::Future;

use crate::{
  ingest::IngestionReport,
  ledger::{AuditEvent, EvidenceArtefact, MatchDecision},
  record::{RawRecord, SourceRecord},
  view::ClientView,
};

/// Abstraction over an SCV persistence backend.
///
/// Raw records are the only thing this core writes; match decisions,
/// evidence artefacts, and audit events are read-only ledgers owned by
/// external processes. The three ledger reads must degrade gracefully: a
/// missing underlying table or a client with no linked rows yields an
/// empty collection, never an error.
pub trait ProfileStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Ingestion ─────────────────────────────────────────────────────────

  /// Idempotently upsert a batch of candidate records as one transaction.
  ///
  /// Candidates missing either natural-key part are counted as skipped
  /// and never persisted. A mid-batch failure rolls the whole batch back.
  fn ingest(
    &self,
    records: Vec<SourceRecord>,
  ) -> impl Future<Output = Result<IngestionReport, Self::Error>> + Send + '_;

  /// Point lookup by natural key. Returns `None` if not found.
  fn get_raw_record<'a>(
    &'a self,
    source_system: &'a str,
    source_record_id: &'a str,
  ) -> impl Future<Output = Result<Option<RawRecord>, Self::Error>> + Send + 'a;

  /// List ingested raw records, optionally filtered by source system,
  /// newest first. Operator read-back for verifying an ingestion run.
  fn list_raw_records<'a>(
    &'a self,
    source_system: Option<&'a str>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<RawRecord>, Self::Error>> + Send + 'a;

  /// Total number of persisted raw records.
  fn raw_record_count(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Clients ───────────────────────────────────────────────────────────

  /// Register a canonical client id. Idempotent; full client CRUD is an
  /// external collaborator's concern, this is the minimal surface the
  /// NotFound contract requires.
  fn add_client<'a>(
    &'a self,
    client_id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn client_exists<'a>(
    &'a self,
    client_id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// The raw records linked to `client_id` through its match decisions,
  /// sorted into assembly (precedence) order. Records with undecodable
  /// stored payloads are excluded, not surfaced.
  fn raw_records_for_client<'a>(
    &'a self,
    client_id: &'a str,
  ) -> impl Future<Output = Result<Vec<RawRecord>, Self::Error>> + Send + 'a;

  // ── Ledger reads (schema-adaptive) ────────────────────────────────────

  /// Match decisions for `client_id`, newest first, limited to `limit`.
  fn match_history<'a>(
    &'a self,
    client_id: &'a str,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<MatchDecision>, Self::Error>> + Send + 'a;

  /// Evidence artefacts whose content substantiates any of the client's
  /// source records. A client with no match decisions yields an empty
  /// list without querying the artefact table.
  fn evidence_artefacts<'a>(
    &'a self,
    client_id: &'a str,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<EvidenceArtefact>, Self::Error>>
  + Send
  + 'a;

  /// Audit events linked to `client_id` via whichever linkage the live
  /// audit table supports.
  fn audit_trail<'a>(
    &'a self,
    client_id: &'a str,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<AuditEvent>, Self::Error>> + Send + 'a;

  // ── Profile read ──────────────────────────────────────────────────────

  /// Materialise the full [`ClientView`] for `client_id`.
  ///
  /// Errors with the backend's NotFound-class error when the client id is
  /// unknown; every contract key is present in the result, even when
  /// empty.
  fn materialize<'a>(
    &'a self,
    client_id: &'a str,
  ) -> impl Future<Output = Result<ClientView, Self::Error>> + Send + 'a;
}
