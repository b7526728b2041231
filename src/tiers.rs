// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tier coordinator: composes the local and remote tiers per descriptor.
//!
//! Reads walk local-first; a remote hit on a two-tier descriptor is
//! promoted into the local tier before it is returned. Writes land in each
//! enabled tier, local first. The per-namespace local tiers are created
//! lazily on first reference, at most one instance per namespace, and
//! live for the process.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::descriptor::CacheDescriptor;
use crate::local::LocalCache;
use crate::metrics;
use crate::remote::RemoteStore;

pub struct TierCoordinator {
    locals: DashMap<String, Arc<LocalCache>>,
    remote: Arc<dyn RemoteStore>,
    default_local_ttl: Duration,
}

impl TierCoordinator {
    pub fn new(remote: Arc<dyn RemoteStore>, default_local_ttl: Duration) -> Self {
        Self {
            locals: DashMap::new(),
            remote,
            default_local_ttl,
        }
    }

    /// The memoized local tier for a descriptor's namespace, created from
    /// the descriptor's bounds on first reference.
    pub fn local_for(&self, desc: &CacheDescriptor) -> Arc<LocalCache> {
        self.locals
            .entry(desc.namespace().to_string())
            .or_insert_with(|| {
                let ttl = if desc.ttl_local.is_zero() {
                    self.default_local_ttl
                } else {
                    desc.ttl_local
                };
                debug!(
                    namespace = desc.namespace(),
                    ttl_secs = ttl.as_secs(),
                    policy = ?desc.eviction_policy,
                    "creating local tier"
                );
                Arc::new(LocalCache::new(
                    ttl,
                    desc.eviction_policy,
                    desc.max_entries,
                    desc.max_weight_bytes,
                ))
            })
            .clone()
    }

    /// Coordinated read: local, then remote with promotion.
    pub async fn get(&self, key: &str, desc: &CacheDescriptor) -> Option<Vec<u8>> {
        if desc.layers.has_local() {
            if let Some(bytes) = self.local_for(desc).get(key) {
                metrics::record_hit("local", desc.namespace());
                return Some(bytes);
            }
        }

        if desc.layers.has_remote() {
            if let Some(bytes) = self.remote.get(key).await {
                if desc.layers.has_local() {
                    self.local_for(desc).put(key, bytes.clone());
                    debug!(key, "remote hit promoted to local tier");
                }
                metrics::record_hit("remote", desc.namespace());
                return Some(bytes);
            }
        }

        None
    }

    /// Coordinated write to each enabled tier, local first. The TTL applies
    /// to the remote tier; the local tier uses its construction TTL.
    pub async fn put(&self, key: &str, bytes: &[u8], ttl: Duration, desc: &CacheDescriptor) {
        if desc.layers.has_local() {
            self.local_for(desc).put(key, bytes.to_vec());
        }
        if desc.layers.has_remote() {
            self.remote.put(key, bytes, ttl).await;
        }
    }

    /// Coordinated evict from each enabled tier.
    pub async fn evict(&self, key: &str, desc: &CacheDescriptor) {
        if desc.layers.has_local() {
            if let Some(local) = self.locals.get(desc.namespace()) {
                local.evict(key);
            }
        }
        if desc.layers.has_remote() {
            self.remote.evict(key).await;
        }
    }

    /// The remote tier, for paths that bypass local composition (the batch
    /// pipeline, lease acquisition).
    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Drop every local tier's contents and clear the remote store.
    pub async fn clear_all(&self) {
        for local in self.locals.iter() {
            local.clear();
        }
        self.remote.clear().await;
    }
}
