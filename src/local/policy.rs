// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Victim selection for the local tier.
//!
//! The cache snapshots its entries' bookkeeping and ranks them
//! eviction-first under the descriptor's policy. The cache then walks the
//! ranking from the front until its bound is satisfied.

use crate::descriptor::EvictionPolicy;

/// Point-in-time view of one entry's eviction bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct EntrySnapshot {
    pub key: String,
    pub weight: usize,
    /// Logical clock value when the entry was written.
    pub inserted_at: u64,
    /// Logical clock value of the most recent read or write.
    pub last_access: u64,
    pub access_count: u64,
}

/// Rank entries eviction-first under the given policy.
pub(crate) fn rank_for_eviction(
    mut entries: Vec<EntrySnapshot>,
    policy: EvictionPolicy,
) -> Vec<EntrySnapshot> {
    match policy {
        EvictionPolicy::Lru => {
            entries.sort_by_key(|e| e.last_access);
        }
        EvictionPolicy::Lfu => {
            // Frequency first; recency breaks ties so a burst of equally
            // cold entries still evicts oldest-first
            entries.sort_by_key(|e| (e.access_count, e.last_access));
        }
        EvictionPolicy::Fifo => {
            entries.sort_by_key(|e| e.inserted_at);
        }
        EvictionPolicy::Weight => {
            entries.sort_by_key(|e| e.weight);
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(key: &str, weight: usize, inserted: u64, accessed: u64, count: u64) -> EntrySnapshot {
        EntrySnapshot {
            key: key.to_string(),
            weight,
            inserted_at: inserted,
            last_access: accessed,
            access_count: count,
        }
    }

    fn keys(entries: &[EntrySnapshot]) -> Vec<&str> {
        entries.iter().map(|e| e.key.as_str()).collect()
    }

    #[test]
    fn lru_ranks_least_recently_used_first() {
        let ranked = rank_for_eviction(
            vec![snap("a", 1, 1, 30, 5), snap("b", 1, 2, 10, 5), snap("c", 1, 3, 20, 5)],
            EvictionPolicy::Lru,
        );
        assert_eq!(keys(&ranked), vec!["b", "c", "a"]);
    }

    #[test]
    fn lfu_ranks_least_frequently_used_first() {
        let ranked = rank_for_eviction(
            vec![snap("a", 1, 1, 10, 9), snap("b", 1, 2, 30, 2), snap("c", 1, 3, 20, 5)],
            EvictionPolicy::Lfu,
        );
        assert_eq!(keys(&ranked), vec!["b", "c", "a"]);
    }

    #[test]
    fn lfu_breaks_frequency_ties_by_recency() {
        let ranked = rank_for_eviction(
            vec![snap("a", 1, 1, 30, 2), snap("b", 1, 2, 10, 2)],
            EvictionPolicy::Lfu,
        );
        assert_eq!(keys(&ranked), vec!["b", "a"]);
    }

    #[test]
    fn fifo_ranks_by_insertion_order() {
        let ranked = rank_for_eviction(
            vec![snap("a", 1, 5, 99, 99), snap("b", 1, 1, 1, 0), snap("c", 1, 3, 50, 7)],
            EvictionPolicy::Fifo,
        );
        assert_eq!(keys(&ranked), vec!["b", "c", "a"]);
    }

    #[test]
    fn weight_ranks_lowest_weight_first() {
        let ranked = rank_for_eviction(
            vec![snap("a", 300, 1, 1, 1), snap("b", 100, 2, 2, 2), snap("c", 200, 3, 3, 3)],
            EvictionPolicy::Weight,
        );
        assert_eq!(keys(&ranked), vec!["b", "c", "a"]);
    }
}
