//! Tag Scanner: which of an item's tags carry a sharing policy.

use crate::policy::PolicyTable;
use crate::types::PolicyEntry;
use std::collections::HashSet;

/// Tags with a policy, in the item's own tag order.
///
/// Tags absent from the table are dropped, as are repeated tags after their
/// first occurrence. Matching is exact.
pub fn find_applicable(tags: &[String], policies: &PolicyTable) -> Vec<(String, PolicyEntry)> {
    let mut seen = HashSet::new();
    tags.iter()
        .filter(|tag| seen.insert(tag.as_str()))
        .filter_map(|tag| policies.get(tag).map(|entry| (tag.clone(), entry.clone())))
        .collect()
}
