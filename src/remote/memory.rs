//! Embedded remote store.
//!
//! A process-local implementation of the full [`RemoteStore`] contract
//! (TTLs, pipelined batch semantics, lease compare-and-set) backed by a
//! [`DashMap`]. Used by the test suite and by single-process deployments
//! that want the engine's full protocol without an external store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::RemoteStore;

struct Stored {
    bytes: Vec<u8>,
    expires_at: Instant,
}

impl Stored {
    fn new(bytes: Vec<u8>, ttl: Duration) -> Self {
        Self { bytes, expires_at: Instant::now() + ttl }
    }

    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process [`RemoteStore`] honoring TTLs and lease semantics.
#[derive(Default)]
pub struct MemoryRemoteStore {
    entries: DashMap<String, Stored>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.value().is_expired(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let expired = {
            let entry = self.entries.get(key)?;
            if entry.is_expired(now) {
                true
            } else {
                return Some(entry.bytes.clone());
            }
        };
        if expired {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
        }
        None
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) {
        self.entries.insert(key.to_string(), Stored::new(value.to_vec(), ttl));
    }

    async fn evict(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn multi_get(&self, keys: &[String]) -> HashMap<String, Vec<u8>> {
        let mut results = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await {
                results.insert(key.clone(), value);
            }
        }
        results
    }

    async fn multi_put(&self, items: &[(String, Vec<u8>)], ttl: Duration) {
        for (key, value) in items {
            self.put(key, value, ttl).await;
        }
    }

    async fn try_acquire_lease(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(Stored::new(b"1".to_vec(), ttl));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Stored::new(b"1".to_vec(), ttl));
                true
            }
        }
    }

    async fn release_lease(&self, key: &str) {
        self.entries.remove(key);
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn clear(&self) {
        self.entries.clear();
    }
}
