//! Null-object remote store.
//!
//! Used when no external store is configured: never available, all reads
//! empty, writes and evictions no-ops, leases never acquired. The engine
//! then runs local-only and the single-flight protocol degrades to
//! concurrent regeneration.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use super::RemoteStore;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRemoteStore;

impl NoopRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteStore for NoopRemoteStore {
    async fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    async fn put(&self, _key: &str, _value: &[u8], _ttl: Duration) {}

    async fn evict(&self, _key: &str) {}

    async fn multi_get(&self, _keys: &[String]) -> HashMap<String, Vec<u8>> {
        HashMap::new()
    }

    async fn multi_put(&self, _items: &[(String, Vec<u8>)], _ttl: Duration) {}

    async fn try_acquire_lease(&self, _key: &str, _ttl: Duration) -> bool {
        false
    }

    async fn release_lease(&self, _key: &str) {}

    fn is_available(&self) -> bool {
        false
    }

    async fn ping(&self) -> bool {
        false
    }

    async fn clear(&self) {}
}
