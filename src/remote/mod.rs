// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote tier: an optional external key→bytes store.
//!
//! The [`RemoteStore`] trait is the engine's seam to the outside world.
//! Runtime operations are **benign on failure** by contract: a failing
//! operation logs, flips the availability flag, and returns the empty
//! value; the engine then degrades to the local tier and the
//! miss-as-loader path. Only construction ([`RedisRemoteStore::connect`])
//! surfaces errors.
//!
//! Implementations:
//! - [`RedisRemoteStore`]: Redis over a multiplexed connection manager,
//!   with pipelined multi-key I/O and `SET NX EX` lease acquisition
//! - [`MemoryRemoteStore`]: embedded store honoring TTL and lease
//!   semantics, for tests and single-process deployments
//! - [`NoopRemoteStore`]: the null object used when no remote is
//!   configured: unavailable, reads empty, writes no-op

pub mod memory;
pub mod noop;
pub mod redis;
pub mod retry;

pub use memory::MemoryRemoteStore;
pub use noop::NoopRemoteStore;
pub use redis::RedisRemoteStore;
pub use retry::RetryConfig;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

/// An external byte-keyed store with TTLs, pipelined batch I/O, and
/// lease acquisition.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Get a value. `None` on miss or failure.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Set a value with a TTL. No-op on failure.
    async fn put(&self, key: &str, value: &[u8], ttl: Duration);

    /// Delete a key. No-op on failure.
    async fn evict(&self, key: &str);

    /// Fetch many keys in a single transport round-trip. Missing keys are
    /// absent from the result. Implementations fall back to per-key gets
    /// when the pipelined form fails, so partial progress is retained.
    async fn multi_get(&self, keys: &[String]) -> HashMap<String, Vec<u8>>;

    /// Write many entries with one TTL in a single transport round-trip,
    /// falling back to per-key puts on failure.
    async fn multi_put(&self, items: &[(String, Vec<u8>)], ttl: Duration);

    /// Single-shot compare-and-set of a lease sentinel with the given TTL.
    /// Returns true iff the caller now holds the lease.
    async fn try_acquire_lease(&self, key: &str, ttl: Duration) -> bool;

    /// Delete a lease sentinel unconditionally. Only the holder may call.
    async fn release_lease(&self, key: &str);

    /// Fast availability flag, maintained by failure paths and the health
    /// probe. Never performs I/O.
    fn is_available(&self) -> bool;

    /// Active health check. A success restores availability.
    async fn ping(&self) -> bool;

    /// Drop every key. Destructive; intended for tests and full flushes.
    async fn clear(&self);
}

/// Spawn the background health probe: one task pinging the store on an
/// interval so availability recovers after an outage. The first probe
/// fires immediately.
///
/// The caller owns the handle and must abort it at shutdown.
pub fn spawn_health_probe(remote: Arc<dyn RemoteStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let healthy = remote.ping().await;
            debug!(healthy, "remote health probe");
        }
    })
}
