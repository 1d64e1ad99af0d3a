//! Upstream feed adapters for the SCV core.
//!
//! Converts tabular feed files into [`scv_core::record::SourceRecord`]
//! batches. Pure synchronous; no HTTP or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use scv_core::ingest::RecordSource as _;
//! use scv_feed::FileFeed;
//!
//! let mut feed = FileFeed::new("fixtures/crm_sample.csv");
//! let records = feed.read().unwrap();
//! println!("{} candidate records", records.len());
//! ```

pub mod error;
mod parse;

use std::path::PathBuf;

use scv_core::{ingest::RecordSource, record::SourceRecord};

pub use error::{Error, Result};

/// Parse a delimited feed document already held in memory.
///
/// The first non-blank line must be a header row naming the columns; the
/// reference feed uses `source_system, source_record_id, first_name,
/// last_name, email`, but any column set is accepted — unknown columns
/// become attributes on the resulting records.
pub fn parse_records(input: &str) -> Result<Vec<SourceRecord>> {
  parse::parse_document(input)
}

// ─── FileFeed ────────────────────────────────────────────────────────────────

/// The reference [`RecordSource`]: a header-row delimited file on disk.
pub struct FileFeed {
  path: PathBuf,
}

impl FileFeed {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl RecordSource for FileFeed {
  type Error = Error;

  fn read(&mut self) -> Result<Vec<SourceRecord>> {
    let text = std::fs::read_to_string(&self.path)?;
    let records = parse_records(&text)?;
    tracing::debug!(
      path = %self.path.display(),
      count = records.len(),
      "read feed file"
    );
    Ok(records)
  }
}
