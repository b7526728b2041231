// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis remote store.
//!
//! Single-key operations map to GET/SETEX/DEL; multi-key operations are
//! pipelined so a batch costs one transport round-trip; lease acquisition
//! is `SET key "1" NX EX ttl`. Every failing operation logs with full
//! context, flips the availability flag, and returns the benign value; the
//! next successful `ping` (usually from the background health probe)
//! restores it. Pipelined operations fall back to per-key operations so
//! partial progress is retained.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, error, info, warn};

use super::retry::{retry, RetryConfig};
use super::RemoteStore;
use crate::metrics;

/// Failed to establish the initial Redis connection.
#[derive(Debug, thiserror::Error)]
#[error("redis connection failed: {0}")]
pub struct ConnectError(#[from] redis::RedisError);

pub struct RedisRemoteStore {
    connection: ConnectionManager,
    available: AtomicBool,
}

impl RedisRemoteStore {
    /// Connect with the default bounded-backoff schedule.
    pub async fn connect(url: &str) -> Result<Self, ConnectError> {
        Self::connect_with(url, &RetryConfig::connect()).await
    }

    /// Connect with a custom backoff schedule.
    pub async fn connect_with(url: &str, config: &RetryConfig) -> Result<Self, ConnectError> {
        let client = Client::open(url)?;

        let connection = retry("redis_connect", config, || async {
            ConnectionManager::new(client.clone()).await
        })
        .await?;

        info!(url, "connected to remote cache store");
        Ok(Self {
            connection,
            available: AtomicBool::new(true),
        })
    }

    fn mark_unavailable(&self, op: &'static str, err: &redis::RedisError) {
        error!(op, error = %err, "remote operation failed, marking tier unavailable");
        if self.available.swap(false, Ordering::AcqRel) {
            metrics::set_remote_available(false);
        }
    }

    fn mark_available(&self) {
        if !self.available.swap(true, Ordering::AcqRel) {
            info!("remote tier recovered");
            metrics::set_remote_available(true);
        }
    }

    fn ttl_secs(ttl: Duration) -> u64 {
        ttl.as_secs().max(1)
    }
}

#[async_trait]
impl RemoteStore for RedisRemoteStore {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if !self.is_available() {
            return None;
        }
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<Option<Vec<u8>>> = conn.get(key).await;
        match result {
            Ok(value) => value,
            Err(e) => {
                self.mark_unavailable("get", &e);
                None
            }
        }
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) {
        if !self.is_available() {
            return;
        }
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<()> = conn.set_ex(key, value, Self::ttl_secs(ttl)).await;
        if let Err(e) = result {
            self.mark_unavailable("put", &e);
        }
    }

    async fn evict(&self, key: &str) {
        if !self.is_available() {
            return;
        }
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<()> = conn.del(key).await;
        if let Err(e) = result {
            self.mark_unavailable("evict", &e);
        }
    }

    async fn multi_get(&self, keys: &[String]) -> HashMap<String, Vec<u8>> {
        if keys.is_empty() || !self.is_available() {
            return HashMap::new();
        }

        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.get(key);
        }

        match pipe.query_async::<Vec<Option<Vec<u8>>>>(&mut conn).await {
            Ok(values) => keys
                .iter()
                .zip(values)
                .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
                .collect(),
            Err(e) => {
                warn!(
                    keys = keys.len(),
                    error = %e,
                    "pipelined multi-get failed, falling back to per-key gets"
                );
                metrics::record_pipeline_fallback("mget");

                let mut results = HashMap::new();
                for key in keys {
                    if !self.is_available() {
                        break;
                    }
                    if let Some(value) = self.get(key).await {
                        results.insert(key.clone(), value);
                    }
                }
                results
            }
        }
    }

    async fn multi_put(&self, items: &[(String, Vec<u8>)], ttl: Duration) {
        if items.is_empty() || !self.is_available() {
            return;
        }

        let secs = Self::ttl_secs(ttl);
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        for (key, value) in items {
            pipe.cmd("SETEX").arg(key).arg(secs).arg(value.as_slice()).ignore();
        }

        match pipe.query_async::<()>(&mut conn).await {
            Ok(()) => {
                debug!(items = items.len(), ttl_secs = secs, "pipelined multi-put complete");
            }
            Err(e) => {
                warn!(
                    items = items.len(),
                    ttl_secs = secs,
                    error = %e,
                    "pipelined multi-put failed, falling back to per-key puts"
                );
                metrics::record_pipeline_fallback("mput");

                for (key, value) in items {
                    if !self.is_available() {
                        break;
                    }
                    self.put(key, value, ttl).await;
                }
            }
        }
    }

    async fn try_acquire_lease(&self, key: &str, ttl: Duration) -> bool {
        if !self.is_available() {
            return false;
        }
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<Option<String>> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(Self::ttl_secs(ttl))
            .query_async(&mut conn)
            .await;

        match result {
            Ok(reply) => reply.is_some(),
            Err(e) => {
                self.mark_unavailable("lease", &e);
                false
            }
        }
    }

    async fn release_lease(&self, key: &str) {
        // Availability is deliberately not consulted: a holder must always
        // attempt the delete, even mid-outage
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<()> = conn.del(key).await;
        match result {
            Ok(()) => debug!(key, "lease released"),
            Err(e) => warn!(key, error = %e, "failed to release lease, TTL will expire it"),
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<String> =
            redis::cmd("PING").query_async(&mut conn).await;
        match result {
            Ok(_) => {
                self.mark_available();
                true
            }
            Err(e) => {
                error!(error = %e, "remote health check failed");
                if self.available.swap(false, Ordering::AcqRel) {
                    metrics::set_remote_available(false);
                }
                false
            }
        }
    }

    async fn clear(&self) {
        if !self.is_available() {
            warn!("remote tier unavailable, cannot clear");
            return;
        }
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<()> = redis::cmd("FLUSHDB").query_async(&mut conn).await;
        match result {
            Ok(()) => info!("remote cache cleared"),
            Err(e) => self.mark_unavailable("clear", &e),
        }
    }
}
