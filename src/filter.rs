// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Negative-lookup shield.
//!
//! One approximate-membership filter per logical namespace, created lazily
//! on the first recorded key. On reads for descriptors that do not memoize
//! nulls, the engine consults the namespace filter and short-circuits
//! identifiers that were never observed as present, the classic
//! cache-penetration defense.
//!
//! Guarantees: false positives are possible (they cost one regular miss);
//! false negatives for keys ever added are not. A namespace with no filter
//! yet reports "might contain", so it can never short-circuit.

use std::sync::RwLock;

use dashmap::DashMap;
use growable_bloom_filter::GrowableBloom;
use tracing::{debug, info, warn};

use crate::config::BloomConfig;

/// Per-namespace negative-lookup filters.
pub struct NegativeLookupFilter {
    filters: DashMap<String, RwLock<GrowableBloom>>,
    expected_insertions: usize,
    false_positive_rate: f64,
}

impl NegativeLookupFilter {
    #[must_use]
    pub fn new(config: &BloomConfig) -> Self {
        Self {
            filters: DashMap::new(),
            expected_insertions: config.expected_insertions,
            false_positive_rate: config.false_positive_rate,
        }
    }

    /// Record a key as present in a namespace, creating the namespace
    /// filter on first use.
    pub fn add(&self, namespace: &str, key: &str) {
        let filter = self.filters.entry(namespace.to_string()).or_insert_with(|| {
            info!(
                namespace,
                expected_insertions = self.expected_insertions,
                false_positive_rate = self.false_positive_rate,
                "creating negative-lookup filter"
            );
            RwLock::new(GrowableBloom::new(
                self.false_positive_rate,
                self.expected_insertions,
            ))
        });
        write_lock(&filter).insert(key);
    }

    /// Whether a key might be present in a namespace.
    ///
    /// `false` means definitely absent (short-circuit allowed). A namespace
    /// without a filter cannot short-circuit and reports `true`.
    #[must_use]
    pub fn might_contain(&self, namespace: &str, key: &str) -> bool {
        match self.filters.get(namespace) {
            Some(filter) => read_lock(&filter).contains(key),
            None => true,
        }
    }

    /// Drop the filter for a namespace (e.g., after a bulk purge made its
    /// contents meaningless).
    pub fn clear(&self, namespace: &str) {
        if self.filters.remove(namespace).is_some() {
            info!(namespace, "negative-lookup filter cleared");
        } else {
            debug!(namespace, "no negative-lookup filter to clear");
        }
    }

    /// Number of namespaces with a live filter.
    #[must_use]
    pub fn namespace_count(&self) -> usize {
        self.filters.len()
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("recovered from poisoned filter lock");
        poisoned.into_inner()
    })
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("recovered from poisoned filter lock");
        poisoned.into_inner()
    })
}
