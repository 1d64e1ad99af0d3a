//! Source precedence — the ordering that drives field-level merging.
//!
//! Profile assembly is "first non-empty value in list order wins", so the
//! order in which raw records are presented *is* the merge policy. This
//! type captures that order as an explicit, configurable list of source
//! systems rather than an implicit property of whatever a query returned.

use serde::{Deserialize, Serialize};

use crate::record::RawRecord;

/// An ordered list of source systems, highest precedence first.
///
/// Records from systems not in the list sort after all listed systems,
/// ordered by `ingested_at` and then natural key so the result is stable.
/// System names compare case-insensitively ("CRM" and "crm" are the same
/// upstream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePrecedence {
  systems: Vec<String>,
}

impl Default for SourcePrecedence {
  /// CRM wins over KYC, matching the original deployment's source order.
  fn default() -> Self {
    Self::new(["crm", "kyc"])
  }
}

impl SourcePrecedence {
  pub fn new<I, S>(systems: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      systems: systems.into_iter().map(Into::into).collect(),
    }
  }

  /// The rank of `system` in the precedence order; unlisted systems rank
  /// after every listed one.
  pub fn rank(&self, system: &str) -> usize {
    self
      .systems
      .iter()
      .position(|s| s.eq_ignore_ascii_case(system))
      .unwrap_or(self.systems.len())
  }

  /// Sort `records` into assembly order.
  pub fn sort(&self, records: &mut [RawRecord]) {
    records.sort_by(|a, b| {
      self
        .rank(&a.source_system)
        .cmp(&self.rank(&b.source_system))
        .then_with(|| a.ingested_at.cmp(&b.ingested_at))
        .then_with(|| a.source_system.cmp(&b.source_system))
        .then_with(|| a.source_record_id.cmp(&b.source_record_id))
    });
  }
}
