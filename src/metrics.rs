//! Metrics instrumentation for the cache engine.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The host
//! process chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `tiercache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `tier`: local, remote
//! - `namespace`: the descriptor's active logical name
//! - `op`: get, put, mget, mput

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a cache hit in a tier.
pub fn record_hit(tier: &'static str, namespace: &str) {
    counter!(
        "tiercache_hits_total",
        "tier" => tier,
        "namespace" => namespace.to_string()
    )
    .increment(1);
}

/// Record a full miss (no tier held the key).
pub fn record_miss(namespace: &str) {
    counter!("tiercache_misses_total", "namespace" => namespace.to_string()).increment(1);
}

/// Record a user-loader invocation.
pub fn record_loader_call(namespace: &str) {
    counter!("tiercache_loader_calls_total", "namespace" => namespace.to_string()).increment(1);
}

/// Record a read short-circuited by the negative-lookup filter.
pub fn record_filter_rejection(namespace: &str) {
    counter!("tiercache_filter_rejections_total", "namespace" => namespace.to_string())
        .increment(1);
}

/// Record a hot-key lease attempt outcome.
pub fn record_lease(acquired: bool) {
    counter!(
        "tiercache_lease_attempts_total",
        "outcome" => if acquired { "acquired" } else { "contended" }
    )
    .increment(1);
}

/// Record a hot-key poll loop that exhausted its retry budget.
pub fn record_poll_exhausted() {
    counter!("tiercache_poll_exhausted_total").increment(1);
}

/// Record a pipelined remote operation degrading to per-key operations.
pub fn record_pipeline_fallback(op: &'static str) {
    counter!("tiercache_pipeline_fallbacks_total", "op" => op).increment(1);
}

/// Record a remote availability transition.
pub fn set_remote_available(available: bool) {
    gauge!("tiercache_remote_available").set(if available { 1.0 } else { 0.0 });
}

/// Record a local-tier eviction sweep's work.
pub fn record_local_eviction(count: usize, bytes: usize) {
    counter!("tiercache_local_evictions_total").increment(count as u64);
    counter!("tiercache_local_evicted_bytes_total").increment(bytes as u64);
}

/// Record batch pipeline shape: input ids, cache hits, loader misses.
pub fn record_batch(namespace: &str, ids: usize, hits: usize, missed: usize) {
    let ns = namespace.to_string();
    histogram!("tiercache_batch_ids", "namespace" => ns.clone()).record(ids as f64);
    counter!("tiercache_batch_hits_total", "namespace" => ns.clone()).increment(hits as u64);
    counter!("tiercache_batch_misses_total", "namespace" => ns).increment(missed as u64);
}

/// Timer recording an operation latency histogram on drop.
///
/// ```
/// let _timer = tiercache::metrics::LatencyTimer::new("get");
/// // ... do the work ...
/// ```
pub struct LatencyTimer {
    op: &'static str,
    start: Instant,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(op: &'static str) -> Self {
        Self { op, start: Instant::now() }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!("tiercache_operation_seconds", "op" => self.op)
            .record(self.start.elapsed().as_secs_f64());
    }
}
