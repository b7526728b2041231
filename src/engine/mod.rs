// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The cache engine: descriptor-driven read-through.
//!
//! [`CacheEngine`] is a value carrying its collaborators (tier
//! coordinator, negative-lookup filters, expression evaluator, descriptor
//! registry) behind `Arc`s; clone it freely. There is no global instance.
//!
//! # Single-lookup path
//!
//! ```text
//! condition gate → key build → key-size gate → negative-lookup shield
//!      → coordinated read (local, then remote with promotion)
//!      → miss: [hot-key lease | poll loop] → loader → encode → write-through
//! ```
//!
//! A cache fault never mutates call semantics: unreadable entries are
//! misses, unwritable results are returned uncached. Only expression
//! misconfiguration and loader failures surface.

mod batch;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::codec;
use crate::config::EngineConfig;
use crate::descriptor::CacheDescriptor;
use crate::error::{BoxError, CacheError};
use crate::expr::{self, CallContext, Evaluator};
use crate::filter::NegativeLookupFilter;
use crate::metrics;
use crate::registry::{CacheBinding, DescriptorRegistry, MethodKey};
use crate::remote::{self, NoopRemoteStore, RedisRemoteStore, RemoteStore};
use crate::tiers::TierCoordinator;

/// Fixed TTL for memoized null markers.
const NULL_RESULT_TTL: Duration = Duration::from_secs(60);

/// Prefix of hot-key lease sentinels in the remote store.
const HOT_KEY_LOCK_PREFIX: &str = "hot_key_lock:";

/// Outcome of decoding a stored entry.
enum Decoded<T> {
    /// The memoized-null marker.
    Null,
    Value(T),
    /// Undecodable payload, treated as a miss.
    Corrupt,
}

#[derive(Clone)]
pub struct CacheEngine {
    config: Arc<EngineConfig>,
    tiers: Arc<TierCoordinator>,
    filters: Arc<NegativeLookupFilter>,
    evaluator: Arc<dyn Evaluator>,
    registry: Arc<DescriptorRegistry>,
}

impl CacheEngine {
    /// Assemble an engine over an explicit remote store.
    pub fn new(
        config: EngineConfig,
        remote: Arc<dyn RemoteStore>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        let config = Arc::new(config);
        let tiers = Arc::new(TierCoordinator::new(
            remote,
            Duration::from_secs(config.default_local_expire_secs),
        ));
        Self {
            filters: Arc::new(NegativeLookupFilter::new(&config.bloom)),
            tiers,
            evaluator,
            registry: Arc::new(DescriptorRegistry::new()),
            config,
        }
    }

    /// Assemble an engine from configuration: Redis when `redis_url` is
    /// set, the null-object remote otherwise.
    pub async fn connect(
        config: EngineConfig,
        evaluator: Arc<dyn Evaluator>,
    ) -> Result<Self, crate::remote::redis::ConnectError> {
        let remote: Arc<dyn RemoteStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisRemoteStore::connect(url).await?),
            None => Arc::new(NoopRemoteStore::new()),
        };
        Ok(Self::new(config, remote, evaluator))
    }

    /// Spawn the remote health probe at the configured interval. The caller
    /// owns the handle and aborts it at shutdown.
    pub fn spawn_health_probe(&self) -> JoinHandle<()> {
        remote::spawn_health_probe(
            self.tiers.remote().clone(),
            Duration::from_secs(self.config.health_probe_secs),
        )
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    #[must_use]
    pub fn tiers(&self) -> &TierCoordinator {
        &self.tiers
    }

    #[must_use]
    pub fn filters(&self) -> &NegativeLookupFilter {
        &self.filters
    }

    /// Descriptor-driven read-through for a single-result operation.
    ///
    /// `loader` is the deferred original call; it runs only on a genuine
    /// miss (or bypass) and its failure propagates untouched.
    #[tracing::instrument(skip_all, fields(namespace = %desc.namespace()))]
    pub async fn get_or_load<T, L, Fut>(
        &self,
        desc: &CacheDescriptor,
        call: &CallContext<'_>,
        loader: L,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, BoxError>>,
    {
        let _timer = metrics::LatencyTimer::new("get_or_load");
        let ctx = call.eval_context();

        // 1. Condition gate
        if let Some(cond) = &desc.condition_expr {
            let value = self.evaluator.evaluate(cond, &ctx).map_err(|e| {
                CacheError::ConditionExpression { expr: cond.clone(), reason: e.to_string() }
            })?;
            if !expr::as_condition(&value) {
                debug!("condition false, bypassing cache");
                metrics::record_loader_call(desc.namespace());
                return loader().await.map_err(CacheError::Loader);
            }
        }

        // 2. Key
        let key = self.build_key(desc, &ctx)?;

        // 3. Key-size gate
        if key.len() > desc.max_key_bytes {
            if desc.reject_oversize_key {
                warn!(key = %key, max_key_bytes = desc.max_key_bytes, "oversize key, bypassing cache");
                metrics::record_loader_call(desc.namespace());
                return loader().await.map_err(CacheError::Loader);
            }
            warn!(key = %key, max_key_bytes = desc.max_key_bytes, "oversize key, caching anyway");
        }

        // 4. Negative-lookup shield
        if !desc.cache_nulls && !self.filters.might_contain(desc.namespace(), &key) {
            debug!(key = %key, "negative-lookup filter rejects key");
            metrics::record_filter_rejection(desc.namespace());
            return Ok(None);
        }

        // 5. Read-through
        if let Some(bytes) = self.tiers.get(&key, desc).await {
            match Self::decode_entry::<T>(&key, &bytes) {
                Decoded::Null => return Ok(None),
                Decoded::Value(v) => return Ok(Some(v)),
                Decoded::Corrupt => {}
            }
        }
        metrics::record_miss(desc.namespace());

        // 6. Miss
        if desc.hot_key && self.tiers.remote().is_available() {
            self.single_flight(desc, call, &key, loader).await
        } else {
            self.regenerate(desc, call, &key, loader).await
        }
    }

    /// Evict a single call's entry from every enabled tier.
    pub async fn evict(
        &self,
        desc: &CacheDescriptor,
        call: &CallContext<'_>,
    ) -> Result<(), CacheError> {
        let key = self.build_key(desc, &call.eval_context())?;
        self.tiers.evict(&key, desc).await;
        Ok(())
    }

    /// Flush every local tier and the remote store. Negative-lookup filters
    /// are left in place: a stale positive only costs a miss.
    pub async fn clear_all(&self) {
        self.tiers.clear_all().await;
    }

    /// Dispatch a single-result call through the registry.
    ///
    /// The interception layer supplies only the method identity, the
    /// argument vector, and the deferred loader; parameter names and the
    /// descriptor come from the registered metadata.
    pub async fn cached_call<T, L, Fut>(
        &self,
        method: &MethodKey,
        args: &[Value],
        loader: L,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, BoxError>>,
    {
        let metadata = self
            .registry
            .get(method)
            .ok_or_else(|| CacheError::UnknownMethod(method.to_string()))?;
        match &metadata.binding {
            CacheBinding::Single(desc) => {
                let call = CallContext::new(&metadata.param_names, args);
                self.get_or_load(desc, &call, loader).await
            }
            CacheBinding::Batch(_) => Err(CacheError::Configuration(format!(
                "{method} is a batch binding, use cached_batch_call"
            ))),
        }
    }

    /// Dispatch a batch call through the registry.
    pub async fn cached_batch_call<T, L, Fut>(
        &self,
        method: &MethodKey,
        args: &[Value],
        bulk_loader: L,
    ) -> Result<Vec<Option<T>>, CacheError>
    where
        T: Serialize + DeserializeOwned + Clone,
        L: FnOnce(Vec<Value>) -> Fut,
        Fut: Future<Output = Result<Vec<T>, BoxError>>,
    {
        let metadata = self
            .registry
            .get(method)
            .ok_or_else(|| CacheError::UnknownMethod(method.to_string()))?;
        match &metadata.binding {
            CacheBinding::Batch(desc) => {
                let call = CallContext::new(&metadata.param_names, args);
                self.get_or_load_batch(desc, &call, bulk_loader).await
            }
            CacheBinding::Single(_) => Err(CacheError::Configuration(format!(
                "{method} is a single binding, use cached_call"
            ))),
        }
    }

    // --- Miss handling ---

    /// Hot-key single-flight: elect one regenerator through a remote lease;
    /// losers poll for the winner's write.
    async fn single_flight<T, L, Fut>(
        &self,
        desc: &CacheDescriptor,
        call: &CallContext<'_>,
        key: &str,
        loader: L,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, BoxError>>,
    {
        let lock_key = format!("{HOT_KEY_LOCK_PREFIX}{key}");
        let remote = self.tiers.remote().clone();

        let acquired = remote
            .try_acquire_lease(&lock_key, self.config.hot_key.lock_timeout())
            .await;
        metrics::record_lease(acquired);

        if acquired {
            debug!(key, "hot-key lease acquired, regenerating");
            let result = self.regenerate(desc, call, key, loader).await;
            // Release on every exit path; a cancelled future leaks the
            // sentinel until its TTL expires
            remote.release_lease(&lock_key).await;
            return result;
        }

        // The acquire attempt may itself have failed and flipped
        // availability; with no reachable remote there is no winner to poll
        if !remote.is_available() {
            return self.regenerate(desc, call, key, loader).await;
        }

        debug!(key, "hot-key lease contended, polling for winner");
        self.poll_for_winner(desc, key).await
    }

    /// Bounded poll loop for lease losers. Exhaustion returns null: the
    /// designed bound on stampede cost, not an error.
    async fn poll_for_winner<T: DeserializeOwned>(
        &self,
        desc: &CacheDescriptor,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        let hot_key = &self.config.hot_key;
        for attempt in 1..=hot_key.retry_count {
            sleep(hot_key.retry_interval()).await;

            if let Some(bytes) = self.tiers.get(key, desc).await {
                match Self::decode_entry::<T>(key, &bytes) {
                    Decoded::Null => return Ok(None),
                    Decoded::Value(v) => {
                        debug!(key, attempt, "hot-key poll hit");
                        return Ok(Some(v));
                    }
                    Decoded::Corrupt => {}
                }
            }
        }

        warn!(
            key,
            retries = hot_key.retry_count,
            "hot-key poll budget exhausted, returning null"
        );
        metrics::record_poll_exhausted();
        Ok(None)
    }

    /// Invoke the loader and write the result through every enabled tier.
    async fn regenerate<T, L, Fut>(
        &self,
        desc: &CacheDescriptor,
        call: &CallContext<'_>,
        key: &str,
        loader: L,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, BoxError>>,
    {
        metrics::record_loader_call(desc.namespace());
        let result = loader().await.map_err(CacheError::Loader)?;

        let Some(value) = result else {
            if desc.cache_nulls {
                self.tiers.put(key, &codec::NULL_MARKER, NULL_RESULT_TTL, desc).await;
                debug!(key, "memoized null result");
            }
            return Ok(None);
        };

        let ttl = self.resolve_ttl(desc, call, &value);
        match codec::encode(&value, desc.compress, desc.compress_threshold) {
            Ok(bytes) => {
                self.filters.add(desc.namespace(), key);
                self.tiers.put(key, &bytes, ttl, desc).await;
            }
            Err(e) => {
                warn!(key, error = %e, "encode failed, returning value without caching");
            }
        }
        Ok(Some(value))
    }

    // --- Helpers ---

    fn build_key(
        &self,
        desc: &CacheDescriptor,
        ctx: &crate::expr::EvalContext<'_>,
    ) -> Result<String, CacheError> {
        let value = self.evaluator.evaluate(&desc.key_expr, ctx).map_err(|e| {
            CacheError::KeyExpression { expr: desc.key_expr.clone(), reason: e.to_string() }
        })?;
        if value.is_null() {
            return Err(CacheError::KeyExpression {
                expr: desc.key_expr.clone(),
                reason: "key expression evaluated to null".into(),
            });
        }
        Ok(desc.qualified_key(&expr::key_string(&value)))
    }

    fn decode_entry<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Decoded<T> {
        if codec::is_null_marker(bytes) {
            return Decoded::Null;
        }
        match codec::decode(bytes) {
            Ok(value) => Decoded::Value(value),
            Err(e) => {
                warn!(key, error = %e, "stored entry undecodable, treating as miss");
                Decoded::Corrupt
            }
        }
    }

    /// TTL resolution order: positive `ttl_expr`, positive remaining
    /// lifetime from `ttl_field` (epoch seconds), `ttl_remote`, configured
    /// default.
    fn resolve_ttl<T: Serialize>(
        &self,
        desc: &CacheDescriptor,
        call: &CallContext<'_>,
        value: &T,
    ) -> Duration {
        if let Some(ttl_expr) = &desc.ttl_expr {
            match self.evaluator.evaluate(ttl_expr, &call.eval_context()) {
                Ok(v) => {
                    if let Some(secs) = expr::as_ttl_secs(&v) {
                        if secs > 0 {
                            return Duration::from_secs(secs as u64);
                        }
                        debug!(ttl_expr = %ttl_expr, secs, "non-positive dynamic TTL ignored");
                    }
                }
                Err(e) => {
                    warn!(ttl_expr = %ttl_expr, error = %e, "TTL expression failed, falling through");
                }
            }
        }

        if let Some(field) = &desc.ttl_field {
            if let Some(ttl) = Self::ttl_from_field(value, field) {
                return ttl;
            }
        }

        if desc.ttl_remote > Duration::ZERO {
            return desc.ttl_remote;
        }
        Duration::from_secs(self.config.default_expire_secs)
    }

    /// Read `field` from the result's serialized form as an absolute expiry
    /// in epoch seconds and convert to a remaining lifetime.
    fn ttl_from_field<T: Serialize>(value: &T, field: &str) -> Option<Duration> {
        let as_value = serde_json::to_value(value).ok()?;
        let expires_at = as_value.get(field)?.as_i64()?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let remaining = expires_at - now;
        if remaining > 0 {
            Some(Duration::from_secs(remaining as u64))
        } else {
            debug!(field = %field, expires_at, "TTL field already in the past, falling through");
            None
        }
    }
}
