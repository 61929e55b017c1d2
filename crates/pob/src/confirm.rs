// Path: crates/pob/src/confirm.rs
//! Last-irreversible-block arithmetic.

use kaon_chain::BlockCache;
use kaon_types::Hash;
use std::collections::HashMap;

/// Walks from `start` toward the cache root counting confirmers, and
/// returns the deepest node confirmed by at least `threshold` distinct
/// witnesses, if any.
///
/// A node contributes a confirmation to the interval `[confirm_until,
/// number]` of block numbers. Walking downward, the contribution of nodes
/// whose `confirm_until` equals the current number is subtracted before
/// descending, so the count is exact over the interval under consideration.
pub fn calculate_confirm(cache: &BlockCache, start: &Hash, threshold: i64) -> Option<Hash> {
    let root_hash = cache.linked_root().hash();
    let mut confirm_num: i64 = 0;
    let mut until_counts: HashMap<i64, i64> = HashMap::new();

    let mut cursor = *start;
    while cursor != root_hash {
        let node = cache.find(&cursor)?;
        if node.confirm_until <= node.number() {
            confirm_num += 1;
            *until_counts.entry(node.confirm_until).or_default() += 1;
        }
        if confirm_num >= threshold {
            return Some(cursor);
        }
        confirm_num -= until_counts.get(&node.number()).copied().unwrap_or(0);
        cursor = node.parent;
    }
    None
}
