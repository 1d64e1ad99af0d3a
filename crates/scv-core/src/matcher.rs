//! Attribute-based matching across assembled profiles.
//!
//! The matching loop is predicate-agnostic: new match strategies are added
//! by supplying new predicates, not by modifying the loop. Comparison is
//! exact — callers needing case- or whitespace-insensitive semantics must
//! normalise before building the predicate.

use crate::{profile::ClientProfile, record::RawRecord};

/// Select the profiles whose raw sources satisfy `predicate`.
///
/// A profile matches iff *any* entry in its `raw_sources` satisfies the
/// predicate. O(profiles × sources-per-profile); both counts are small and
/// bounded in this domain.
pub fn match_profiles<'a, P>(
  profiles: &'a [ClientProfile],
  predicate: P,
) -> Vec<&'a ClientProfile>
where
  P: Fn(&RawRecord) -> bool,
{
  profiles
    .iter()
    .filter(|profile| profile.raw_sources.values().any(&predicate))
    .collect()
}

/// The reference predicate: exact equality on a named attribute.
pub fn attribute_equals<'a>(
  attribute: &'a str,
  value: &'a str,
) -> impl Fn(&RawRecord) -> bool + 'a {
  move |record| record.text_attr(attribute) == Some(value)
}

/// Convenience wrapper: `match_profiles` with [`attribute_equals`].
pub fn match_by_attribute<'a>(
  profiles: &'a [ClientProfile],
  attribute: &str,
  value: &str,
) -> Vec<&'a ClientProfile> {
  match_profiles(profiles, attribute_equals(attribute, value))
}
