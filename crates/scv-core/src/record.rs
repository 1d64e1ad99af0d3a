//! Raw upstream records — the fundamental input of the SCV core.
//!
//! A [`SourceRecord`] is a candidate read from a feed, before validation.
//! A [`RawRecord`] is the persisted form: its natural key
//! `(source_system, source_record_id)` is guaranteed non-empty and unique.
//! Raw records are never duplicated; re-ingesting the same natural key
//! overwrites the mutable attribute map in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The open attribute map carried by every record. Upstream systems expose
/// wildly different shapes, so everything beyond the natural key lives here.
pub type Attributes = Map<String, Value>;

// ─── SourceRecord ────────────────────────────────────────────────────────────

/// A candidate record as read from an upstream feed.
///
/// The natural-key parts are optional here: a record missing either is
/// counted as skipped by ingestion rather than rejected as a batch error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRecord {
  pub source_system:    Option<String>,
  pub source_record_id: Option<String>,
  pub attributes:       Attributes,
}

impl SourceRecord {
  /// The validated natural key, or `None` if either part is missing/blank.
  pub fn natural_key(&self) -> Option<(&str, &str)> {
    let system = non_empty(self.source_system.as_deref())?;
    let id = non_empty(self.source_record_id.as_deref())?;
    Some((system, id))
  }
}

// ─── RawRecord ───────────────────────────────────────────────────────────────

/// A persisted upstream record.
///
/// `ingested_at` is set once at first insert; `updated_at` moves on every
/// overwrite of the same natural key. Equal timestamps mean the row has
/// never been updated since insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
  pub source_system:    String,
  pub source_record_id: String,
  pub attributes:       Attributes,
  pub ingested_at:      DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

impl RawRecord {
  /// Look up a string attribute, treating blank/whitespace-only values as
  /// absent. Non-string attribute values are not coerced.
  pub fn text_attr(&self, name: &str) -> Option<&str> {
    match self.attributes.get(name) {
      Some(Value::String(s)) => non_empty(Some(s)),
      _ => None,
    }
  }

  /// The provenance tag for this record: an explicit `_source` attribute
  /// wins, falling back to the record's own `source_system`.
  ///
  /// Records without a tag are excluded from profile assembly entirely —
  /// scalar precedence, identifier/address aggregation, and `raw_sources`
  /// alike (see [`crate::profile::assemble`]).
  pub fn source_tag(&self) -> Option<&str> {
    self
      .text_attr("_source")
      .or_else(|| non_empty(Some(&self.source_system)))
  }

  /// The upstream identifier this record exposes, if any.
  pub fn identifier(&self) -> Option<&str> {
    self.text_attr("identifier")
  }

  /// Parse the `address` sub-structure into a [`ClientAddress`], tagged
  /// with this record's source. An absent, empty, or non-object `address`
  /// attribute yields `None`.
  pub fn address(&self) -> Option<ClientAddress> {
    let source = self.source_tag()?.to_owned();
    let Some(Value::Object(addr)) = self.attributes.get("address") else {
      return None;
    };
    if addr.is_empty() {
      return None;
    }

    let field = |name: &str| -> Option<String> {
      match addr.get(name) {
        Some(Value::String(s)) => non_empty(Some(s)).map(str::to_owned),
        _ => None,
      }
    };

    Some(ClientAddress {
      line1:    field("line1"),
      line2:    field("line2"),
      city:     field("city"),
      postcode: field("postcode"),
      country:  field("country"),
      source,
    })
  }
}

// ─── Aggregated sub-types ────────────────────────────────────────────────────

/// An identifier for a client from a specific upstream system.
/// Purely additive: one per raw record exposing one, never deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentifier {
  pub system: String,
  pub value:  String,
}

/// A normalised postal address, tagged with the upstream system it came
/// from. Additive across sources; no precedence or merging applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAddress {
  pub line1:    Option<String>,
  pub line2:    Option<String>,
  pub city:     Option<String>,
  pub postcode: Option<String>,
  pub country:  Option<String>,
  pub source:   String,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Trim `s` and map blank results to `None`.
pub(crate) fn non_empty(s: Option<&str>) -> Option<&str> {
  let t = s?.trim();
  (!t.is_empty()).then_some(t)
}
