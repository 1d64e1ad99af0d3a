//! Header-row delimited (CSV) parser.
//!
//! Pipeline:
//!   raw &str
//!     └─ lines (CRLF-tolerant, blank lines dropped)
//!          └─ split_fields()  → cells per line
//!               └─ build_record() → SourceRecord
//!
//! The natural-key columns `source_system` and `source_record_id` populate
//! the record's key fields; every other column lands in the open attribute
//! map. Blank cells are dropped rather than stored as empty strings, so
//! downstream non-empty checks see them as absent.

use scv_core::record::SourceRecord;
use serde_json::Value;

use crate::error::{Error, Result};

/// Parse a whole feed document. The first non-blank line is the header.
pub(crate) fn parse_document(input: &str) -> Result<Vec<SourceRecord>> {
  let mut lines = input
    .split('\n')
    .enumerate()
    .map(|(i, raw)| (i + 1, raw.strip_suffix('\r').unwrap_or(raw)))
    .filter(|(_, line)| !line.trim().is_empty());

  let (header_no, header) = lines.next().ok_or(Error::MissingHeader)?;
  let columns: Vec<String> = split_fields(header, header_no)?
    .into_iter()
    .map(|c| c.trim().to_string())
    .collect();
  if columns.iter().all(String::is_empty) {
    return Err(Error::EmptyHeader);
  }

  let mut records = Vec::new();
  for (line_no, line) in lines {
    let cells = split_fields(line, line_no)?;
    records.push(build_record(&columns, &cells));
  }
  Ok(records)
}

/// Split one line into cells. Double-quoted fields may contain commas and
/// escaped quotes (`""`); a quote opening mid-cell is kept literal.
fn split_fields(line: &str, line_no: usize) -> Result<Vec<String>> {
  let mut cells = Vec::new();
  let mut cell = String::new();
  let mut in_quotes = false;
  let mut chars = line.chars().peekable();

  while let Some(c) = chars.next() {
    match c {
      '"' if in_quotes => {
        if chars.peek() == Some(&'"') {
          chars.next();
          cell.push('"');
        } else {
          in_quotes = false;
        }
      }
      '"' if cell.is_empty() => in_quotes = true,
      '"' => cell.push('"'),
      ',' if !in_quotes => cells.push(std::mem::take(&mut cell)),
      _ => cell.push(c),
    }
  }

  if in_quotes {
    return Err(Error::UnterminatedQuote { line: line_no });
  }
  cells.push(cell);
  Ok(cells)
}

/// Zip one row against the header. Short rows leave trailing columns
/// absent; extra cells beyond the header are ignored.
fn build_record(columns: &[String], cells: &[String]) -> SourceRecord {
  let mut record = SourceRecord::default();

  for (column, cell) in columns.iter().zip(cells) {
    let value = cell.trim();
    if column.is_empty() || value.is_empty() {
      continue;
    }
    match column.as_str() {
      "source_system" => record.source_system = Some(value.to_string()),
      "source_record_id" => {
        record.source_record_id = Some(value.to_string())
      }
      _ => {
        record
          .attributes
          .insert(column.clone(), Value::String(value.to_string()));
      }
    }
  }

  record
}
