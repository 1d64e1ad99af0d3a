//! Canonical client profile and the assembly function that derives it.
//!
//! A [`ClientProfile`] is never stored as ground truth: it is recomputed on
//! every read from the current raw records, so [`assemble`] must be a pure
//! function of its inputs. All collection fields use `BTreeMap` to keep the
//! serialised form byte-stable for identical inputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{ClientAddress, ClientIdentifier, RawRecord};

/// The fixed, ordered list of canonical scalar fields. Each is filled from
/// the first record (in input order) exposing a non-empty attribute of the
/// same name.
pub const SCALAR_FIELDS: [&str; 5] =
  ["name", "email", "phone", "country", "primary_address"];

// ─── ClientProfile ───────────────────────────────────────────────────────────

/// The merged, single representation of a client across all source systems.
///
/// Invariant: `lineage[f]` is `Some` exactly when the scalar field `f` is
/// `Some`, and names the source tag of the record that supplied the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProfile {
  pub client_id:       String,
  pub name:            Option<String>,
  pub email:           Option<String>,
  pub phone:           Option<String>,
  pub country:         Option<String>,
  pub primary_address: Option<String>,

  pub identifiers: Vec<ClientIdentifier>,
  pub addresses:   Vec<ClientAddress>,

  /// Which upstream source supplied each kept scalar value.
  pub lineage: BTreeMap<String, Option<String>>,

  /// Data-quality indicators. Populated by out-of-scope enrichment; always
  /// present in the output shape.
  pub quality: BTreeMap<String, f64>,

  /// Free-form assembly metadata. Always present in the output shape.
  pub metadata: BTreeMap<String, String>,

  /// The raw inputs, keyed by source tag.
  pub raw_sources: BTreeMap<String, RawRecord>,
}

impl ClientProfile {
  /// Read a canonical scalar field by name. Unknown names yield `None`.
  pub fn scalar(&self, field: &str) -> Option<&str> {
    match field {
      "name" => self.name.as_deref(),
      "email" => self.email.as_deref(),
      "phone" => self.phone.as_deref(),
      "country" => self.country.as_deref(),
      "primary_address" => self.primary_address.as_deref(),
      _ => None,
    }
  }
}

// ─── Assembly ────────────────────────────────────────────────────────────────

/// Assemble the canonical profile for `client_id` from `records`.
///
/// Precedence is defined purely by the order of `records`: for each scalar
/// field the first record exposing a non-empty value wins, and its source
/// tag is written to `lineage`. Identifiers and addresses aggregate
/// additively, one entry per record exposing them.
///
/// Records whose [`RawRecord::source_tag`] is `None` take no part in
/// assembly at all — not in scalar precedence, not in identifier/address
/// aggregation, and not in `raw_sources`. A tagless record cannot satisfy
/// the lineage invariant, so it is dropped uniformly rather than
/// per-aggregate.
pub fn assemble(client_id: &str, records: &[RawRecord]) -> ClientProfile {
  let tagged: Vec<&RawRecord> =
    records.iter().filter(|r| r.source_tag().is_some()).collect();

  let mut lineage: BTreeMap<String, Option<String>> = BTreeMap::new();
  let mut pick = |field: &str| -> Option<String> {
    for rec in &tagged {
      if let Some(value) = rec.text_attr(field) {
        lineage
          .insert(field.to_string(), rec.source_tag().map(str::to_owned));
        return Some(value.to_owned());
      }
    }
    lineage.insert(field.to_string(), None);
    None
  };

  // SCALAR_FIELDS order; `pick` records lineage as a side effect.
  let name = pick("name");
  let email = pick("email");
  let phone = pick("phone");
  let country = pick("country");
  let primary_address = pick("primary_address");

  let identifiers = tagged
    .iter()
    .filter_map(|rec| {
      let value = rec.identifier()?;
      Some(ClientIdentifier {
        system: rec.source_tag().unwrap_or_default().to_owned(),
        value:  value.to_owned(),
      })
    })
    .collect();

  let addresses = tagged.iter().filter_map(|rec| rec.address()).collect();

  let raw_sources = tagged
    .iter()
    .filter_map(|rec| {
      Some((rec.source_tag()?.to_owned(), (*rec).clone()))
    })
    .collect();

  ClientProfile {
    client_id: client_id.to_owned(),
    name,
    email,
    phone,
    country,
    primary_address,
    identifiers,
    addresses,
    lineage,
    quality: BTreeMap::new(),
    metadata: BTreeMap::new(),
    raw_sources,
  }
}
