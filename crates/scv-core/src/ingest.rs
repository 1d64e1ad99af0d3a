//! Ingestion input/output types and the pluggable source abstraction.

use serde::{Deserialize, Serialize};

use crate::record::SourceRecord;

/// Per-batch ingestion counters.
///
/// `total` counts every candidate seen; `skipped` counts candidates with a
/// missing natural key; the rest split into `inserted` (new natural key)
/// and `updated` (overwrite of an existing one). Re-running an identical
/// batch reports `inserted = 0, updated = N` and never grows the table.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct IngestionReport {
  pub total:    usize,
  pub inserted: usize,
  pub updated:  usize,
  pub skipped:  usize,
}

/// A pluggable upstream feed yielding candidate records.
///
/// Implemented by `scv-feed` for header-row delimited files; tests and
/// other adapters can implement it over any record source. `read` returns
/// the whole batch: ingestion is batch/pull-based, one transaction per
/// invocation.
pub trait RecordSource {
  type Error: std::error::Error + Send + Sync + 'static;

  fn read(&mut self) -> Result<Vec<SourceRecord>, Self::Error>;
}
