//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings; attribute maps as
//! compact JSON. Ledger tables are owned by other processes and make no
//! type promises, so a second family of *lenient* coercions maps whatever
//! SQL value is actually in a column to the domain's optional fields.

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use scv_core::record::{Attributes, RawRecord};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Attributes ──────────────────────────────────────────────────────────────

pub fn encode_attributes(attrs: &Attributes) -> Result<String> {
  Ok(serde_json::to_string(attrs)?)
}

pub fn decode_attributes(s: &str) -> Result<Attributes> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `raw_records` row.
pub struct RawRecordRow {
  pub source_system:    String,
  pub source_record_id: String,
  pub attributes:       String,
  pub ingested_at:      String,
  pub updated_at:       String,
}

impl RawRecordRow {
  pub fn into_record(self) -> Result<RawRecord> {
    Ok(RawRecord {
      source_system:    self.source_system,
      source_record_id: self.source_record_id,
      attributes:       decode_attributes(&self.attributes)?,
      ingested_at:      decode_dt(&self.ingested_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Lenient ledger coercions ────────────────────────────────────────────────

/// Best-effort text view of an arbitrary SQL value. Numbers are rendered;
/// NULLs and blobs are absent.
pub fn text_of(v: &SqlValue) -> Option<String> {
  match v {
    SqlValue::Text(s) => Some(s.clone()),
    SqlValue::Integer(i) => Some(i.to_string()),
    SqlValue::Real(f) => Some(f.to_string()),
    SqlValue::Null | SqlValue::Blob(_) => None,
  }
}

pub fn f64_of(v: &SqlValue) -> Option<f64> {
  match v {
    SqlValue::Real(f) => Some(*f),
    SqlValue::Integer(i) => Some(*i as f64),
    SqlValue::Text(s) => s.trim().parse().ok(),
    SqlValue::Null | SqlValue::Blob(_) => None,
  }
}

/// Parse a timestamp column leniently: RFC 3339 first, then the bare
/// `YYYY-MM-DD HH:MM:SS` shape SQLite's `datetime()` emits. Unparseable
/// values are absent rather than errors.
pub fn dt_of(v: &SqlValue) -> Option<DateTime<Utc>> {
  let s = text_of(v)?;
  if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
    return Some(dt.with_timezone(&Utc));
  }
  chrono::NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
    .ok()
    .map(|naive| naive.and_utc())
}

/// Parse a text column as JSON, falling back to wrapping the raw text in a
/// JSON string so malformed ledger payloads still surface to callers.
pub fn json_of(v: &SqlValue) -> serde_json::Value {
  match v {
    SqlValue::Text(s) => serde_json::from_str(s)
      .unwrap_or_else(|_| serde_json::Value::String(s.clone())),
    SqlValue::Integer(i) => serde_json::Value::from(*i),
    SqlValue::Real(f) => serde_json::Value::from(*f),
    SqlValue::Null | SqlValue::Blob(_) => serde_json::Value::Null,
  }
}
