//! Deduplication, protocol splitting and chunking of descriptor lists.

use std::collections::{BTreeMap, HashSet};

use crate::descriptor::{extract_endpoint, scheme_of, Scheme};
use crate::security::is_insecure;

/// Deduplicate descriptors by exact text and by endpoint, keeping first-seen order.
///
/// A descriptor is dropped when its exact text was already emitted, or when
/// it resolves to a `host:port` already emitted under a different text.
/// Descriptors without an endpoint only dedupe by text.
pub fn dedupe<S: AsRef<str>>(descriptors: &[S]) -> Vec<String> {
    let mut seen_text: HashSet<&str> = HashSet::new();
    let mut seen_endpoints: HashSet<String> = HashSet::new();
    let mut unique = Vec::new();

    for descriptor in descriptors {
        let text = descriptor.as_ref().trim();
        if text.is_empty() || !seen_text.insert(text) {
            continue;
        }

        if let Some(endpoint) = extract_endpoint(text) {
            if !seen_endpoints.insert(endpoint.to_string()) {
                continue;
            }
        }

        unique.push(text.to_string());
    }

    unique
}

/// Descriptors of one scheme: everything, and the subset not flagged insecure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolGroup {
    pub all: Vec<String>,
    pub secure: Vec<String>,
}

/// Partition descriptors by scheme. Unknown schemes are ignored.
///
/// Exact duplicates within a group are dropped, preserving order.
pub fn split_by_protocol<S: AsRef<str>>(descriptors: &[S]) -> BTreeMap<Scheme, ProtocolGroup> {
    let mut groups: BTreeMap<Scheme, ProtocolGroup> = BTreeMap::new();
    let mut seen: HashSet<(Scheme, &str)> = HashSet::new();

    for descriptor in descriptors {
        let text = descriptor.as_ref().trim();
        let Some(scheme) = scheme_of(text) else {
            continue;
        };
        if !seen.insert((scheme, text)) {
            continue;
        }

        let group = groups.entry(scheme).or_default();
        group.all.push(text.to_string());
        if !is_insecure(text) {
            group.secure.push(text.to_string());
        }
    }

    groups
}

/// Split an ordered list into windows of at most `max_per_file` entries.
///
/// Empty input yields no chunks; a zero limit is treated as one.
pub fn chunk<T: Clone>(items: &[T], max_per_file: usize) -> Vec<Vec<T>> {
    items
        .chunks(max_per_file.max(1))
        .map(|window| window.to_vec())
        .collect()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Descriptors drawn from a small pool so duplicates are frequent
    fn descriptor_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u8..4, 0u16..3).prop_map(|(h, p)| format!("vless://id@host{}:{}?x=1", h, p)),
            (0u8..4, 0u16..3).prop_map(|(h, p)| format!("trojan://pw@host{}:{}#n", h, p)),
            (0u8..6).prop_map(|n| format!("vmess://opaque{}", n)),
        ]
    }

    proptest! {
        /// Deduplicating twice is the same as deduplicating once
        #[test]
        fn prop_dedupe_idempotent(list in prop::collection::vec(descriptor_strategy(), 0..60)) {
            let once = dedupe(&list);
            let twice = dedupe(&once);
            prop_assert_eq!(once, twice);
        }

        /// Output is an order-preserving subsequence of the input
        #[test]
        fn prop_dedupe_preserves_order(list in prop::collection::vec(descriptor_strategy(), 0..60)) {
            let unique = dedupe(&list);
            let mut cursor = list.iter();
            for kept in &unique {
                prop_assert!(cursor.any(|item| item == kept));
            }
        }

        /// No two outputs share text or endpoint
        #[test]
        fn prop_dedupe_unique_keys(list in prop::collection::vec(descriptor_strategy(), 0..60)) {
            let unique = dedupe(&list);
            let texts: HashSet<_> = unique.iter().collect();
            prop_assert_eq!(texts.len(), unique.len());
            let endpoints: Vec<_> = unique.iter().filter_map(|d| extract_endpoint(d)).collect();
            let endpoint_set: HashSet<_> = endpoints.iter().collect();
            prop_assert_eq!(endpoint_set.len(), endpoints.len());
        }

        /// Chunking loses nothing and respects the limit
        #[test]
        fn prop_chunk_concat_identity(items in prop::collection::vec(any::<u16>(), 0..500), max in 1usize..120) {
            let chunks = chunk(&items, max);
            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= max));
            let flat: Vec<u16> = chunks.into_iter().flatten().collect();
            prop_assert_eq!(flat, items);
        }
    }
}
