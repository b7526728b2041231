// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process tier: a bounded per-namespace byte store.
//!
//! Every entry carries a write-time TTL (fixed per cache at construction);
//! expired entries are absent from `get` and purged during eviction sweeps.
//! When the configured bound is exceeded, victims are selected by the
//! descriptor's [`EvictionPolicy`]; victim ranking lives in the `policy`
//! submodule.
//!
//! Safe for concurrent access: entries live in a [`DashMap`] and the
//! recency/frequency bookkeeping uses atomics, so reads never take a write
//! lock.

mod policy;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::descriptor::EvictionPolicy;
use policy::EntrySnapshot;

struct Entry {
    bytes: Vec<u8>,
    expires_at: Instant,
    inserted_at: u64,
    last_access: AtomicU64,
    access_count: AtomicU64,
}

impl Entry {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A bounded in-process key→bytes store for one logical namespace.
pub struct LocalCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
    policy: EvictionPolicy,
    max_entries: u64,
    max_weight_bytes: u64,
    weight_bytes: AtomicUsize,
    /// Logical clock ordering inserts and accesses.
    clock: AtomicU64,
}

impl LocalCache {
    #[must_use]
    pub fn new(
        ttl: Duration,
        policy: EvictionPolicy,
        max_entries: u64,
        max_weight_bytes: u64,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            policy,
            max_entries: max_entries.max(1),
            max_weight_bytes: max_weight_bytes.max(1),
            weight_bytes: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
        }
    }

    /// Get an unexpired entry's payload.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let expired = {
            let entry = self.entries.get(key)?;
            if entry.is_expired(now) {
                true
            } else {
                let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
                entry.last_access.store(tick, Ordering::Relaxed);
                entry.access_count.fetch_add(1, Ordering::Relaxed);
                return Some(entry.bytes.clone());
            }
        };
        if expired {
            self.remove_if_expired(key, now);
        }
        None
    }

    /// Insert or overwrite an entry. The write-time TTL and, if a bound is
    /// now exceeded, an eviction sweep apply.
    pub fn put(&self, key: &str, bytes: Vec<u8>) {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        let new_weight = bytes.len();
        let entry = Entry {
            bytes,
            expires_at: Instant::now() + self.ttl,
            inserted_at: tick,
            last_access: AtomicU64::new(tick),
            access_count: AtomicU64::new(0),
        };

        if let Some(old) = self.entries.insert(key.to_string(), entry) {
            let current = self.weight_bytes.load(Ordering::Acquire);
            let updated = current.saturating_sub(old.bytes.len()).saturating_add(new_weight);
            self.weight_bytes.store(updated, Ordering::Release);
        } else {
            self.weight_bytes.fetch_add(new_weight, Ordering::Release);
        }

        if self.over_bound() {
            self.sweep();
        }
    }

    /// Remove an entry.
    pub fn evict(&self, key: &str) {
        if let Some((_, old)) = self.entries.remove(key) {
            self.sub_weight(old.bytes.len());
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
        self.weight_bytes.store(0, Ordering::Release);
    }

    /// Current entry count (expired-but-unswept entries included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current tracked payload weight in bytes.
    #[must_use]
    pub fn weight_bytes(&self) -> usize {
        self.weight_bytes.load(Ordering::Acquire)
    }

    /// Whether an unexpired entry exists without touching recency.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries.get(key).map(|e| !e.is_expired(now)).unwrap_or(false)
    }

    fn over_bound(&self) -> bool {
        match self.policy {
            EvictionPolicy::Weight => {
                self.weight_bytes.load(Ordering::Acquire) as u64 > self.max_weight_bytes
            }
            _ => self.entries.len() as u64 > self.max_entries,
        }
    }

    fn remove_if_expired(&self, key: &str, now: Instant) {
        if let Some((_, old)) = self.entries.remove_if(key, |_, e| e.is_expired(now)) {
            self.sub_weight(old.bytes.len());
        }
    }

    // Sizes are estimates under concurrent churn; saturate rather than wrap
    fn sub_weight(&self, len: usize) {
        let current = self.weight_bytes.load(Ordering::Acquire);
        self.weight_bytes.store(current.saturating_sub(len), Ordering::Release);
    }

    /// Purge expired entries, then evict ranked victims until back under
    /// the bound.
    fn sweep(&self) {
        let now = Instant::now();

        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        for key in &expired {
            self.remove_if_expired(key, now);
        }

        if !self.over_bound() {
            if !expired.is_empty() {
                debug!(expired = expired.len(), "local tier sweep purged expired entries");
            }
            return;
        }

        // LFU ages by halving counts each sweep so stale popularity decays
        if self.policy == EvictionPolicy::Lfu {
            for entry in self.entries.iter() {
                let count = entry.access_count.load(Ordering::Relaxed);
                entry.access_count.store(count / 2, Ordering::Relaxed);
            }
        }

        let snapshot: Vec<EntrySnapshot> = self
            .entries
            .iter()
            .map(|e| EntrySnapshot {
                key: e.key().clone(),
                weight: e.value().bytes.len(),
                inserted_at: e.value().inserted_at,
                last_access: e.value().last_access.load(Ordering::Relaxed),
                access_count: e.value().access_count.load(Ordering::Relaxed),
            })
            .collect();

        let ranked = policy::rank_for_eviction(snapshot, self.policy);

        let mut evicted = 0usize;
        let mut evicted_bytes = 0usize;
        for victim in &ranked {
            if !self.over_bound() {
                break;
            }
            if let Some((_, old)) = self.entries.remove(&victim.key) {
                let len = old.bytes.len();
                self.sub_weight(len);
                evicted += 1;
                evicted_bytes += len;
            }
        }

        debug!(
            policy = ?self.policy,
            evicted,
            evicted_bytes,
            expired = expired.len(),
            remaining = self.entries.len(),
            "local tier eviction sweep"
        );
        crate::metrics::record_local_eviction(evicted, evicted_bytes);
    }
}
