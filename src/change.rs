//! Change detection between runs.
//!
//! A light pass only enumerates the billboard and compares the listing
//! URLs against the last persisted catalog; a heavy pass is warranted
//! exactly when the sets differ.

use std::collections::BTreeSet;

use crate::models::{ListingRef, MovieRecord};

/// Build a deterministic, order-insensitive ref set.
pub fn ref_set<I, S>(refs: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    refs.into_iter().map(Into::into).collect()
}

/// Refs of a previously persisted catalog. A missing catalog is an empty
/// slice upstream, which yields the empty set.
pub fn catalog_refs(records: &[MovieRecord]) -> BTreeSet<String> {
    records.iter().map(|r| r.href.clone()).collect()
}

/// Whether the billboard changed since the last persisted catalog.
/// Exact set equality; any addition or removal triggers a heavy pass.
pub fn needs_heavy_pass(current: &BTreeSet<String>, previous: &BTreeSet<String>) -> bool {
    current != previous
}

/// Convenience over raw enumeration output.
pub fn listing_changed(current: &[ListingRef], previous: &BTreeSet<String>) -> bool {
    needs_heavy_pass(&ref_set(current.iter().cloned()), previous)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_sets_any_order() {
        let current = ref_set(["b", "a", "c"]);
        let previous = ref_set(["a", "c", "b"]);
        assert!(!needs_heavy_pass(&current, &previous));
    }

    #[test]
    fn test_addition_triggers() {
        let current = ref_set(["a", "b", "c"]);
        let previous = ref_set(["a", "b"]);
        assert!(needs_heavy_pass(&current, &previous));
    }

    #[test]
    fn test_removal_triggers() {
        let current = ref_set(["a"]);
        let previous = ref_set(["a", "b"]);
        assert!(needs_heavy_pass(&current, &previous));
    }

    #[test]
    fn test_empty_previous_triggers() {
        let current = ref_set(["a"]);
        assert!(needs_heavy_pass(&current, &BTreeSet::new()));
    }

    #[test]
    fn test_both_empty_no_change() {
        assert!(!needs_heavy_pass(&BTreeSet::new(), &BTreeSet::new()));
    }
}
