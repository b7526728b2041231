//! Configuration for the cache engine.
//!
//! # Example
//!
//! ```
//! use tiercache::EngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = EngineConfig::default();
//! assert_eq!(config.default_expire_secs, 3600);
//!
//! // Full config
//! let config = EngineConfig {
//!     redis_url: Some("redis://localhost:6379".into()),
//!     default_expire_secs: 1800,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;
use std::time::Duration;

/// Configuration for the cache engine.
///
/// All fields have sensible defaults. Without `redis_url` the engine runs
/// with a null-object remote tier: local-only caching, no leases.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Redis connection string (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Fallback remote TTL in seconds, used when a descriptor resolves no
    /// positive TTL of its own (default: 3600)
    #[serde(default = "default_expire_secs")]
    pub default_expire_secs: u64,

    /// Fallback local-tier TTL in seconds (default: 600)
    #[serde(default = "default_local_expire_secs")]
    pub default_local_expire_secs: u64,

    /// Sizing hint for externally injected preload/refresh schedulers.
    /// The engine itself spawns no pool; the knob is carried for the host.
    #[serde(default = "default_scheduler_pool_size")]
    pub scheduler_pool_size: usize,

    /// Remote health probe interval in seconds (default: 30)
    #[serde(default = "default_health_probe_secs")]
    pub health_probe_secs: u64,

    /// Negative-lookup filter sizing
    #[serde(default)]
    pub bloom: BloomConfig,

    /// Hot-key single-flight tuning
    #[serde(default)]
    pub hot_key: HotKeyConfig,
}

/// Sizing for the per-namespace negative-lookup filters.
#[derive(Debug, Clone, Deserialize)]
pub struct BloomConfig {
    /// Expected insertions per namespace (default: 1,000,000)
    #[serde(default = "default_expected_insertions")]
    pub expected_insertions: usize,

    /// Target false-positive probability (default: 0.01)
    #[serde(default = "default_false_positive_rate")]
    pub false_positive_rate: f64,
}

/// Tuning for the hot-key single-flight protocol.
///
/// `retry_count * retry_interval_ms` should be comparable to, or slightly
/// below, `lock_timeout_secs` so lease losers do not give up while the
/// winner is still regenerating.
#[derive(Debug, Clone, Deserialize)]
pub struct HotKeyConfig {
    /// Poll iterations for lease losers (default: 10)
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Sleep between polls in milliseconds (default: 50)
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Lease TTL in seconds (default: 5)
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

fn default_expire_secs() -> u64 { 3600 }
fn default_local_expire_secs() -> u64 { 600 }
fn default_scheduler_pool_size() -> usize { 5 }
fn default_health_probe_secs() -> u64 { 30 }
fn default_expected_insertions() -> usize { 1_000_000 }
fn default_false_positive_rate() -> f64 { 0.01 }
fn default_retry_count() -> u32 { 10 }
fn default_retry_interval_ms() -> u64 { 50 }
fn default_lock_timeout_secs() -> u64 { 5 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            default_expire_secs: default_expire_secs(),
            default_local_expire_secs: default_local_expire_secs(),
            scheduler_pool_size: default_scheduler_pool_size(),
            health_probe_secs: default_health_probe_secs(),
            bloom: BloomConfig::default(),
            hot_key: HotKeyConfig::default(),
        }
    }
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            expected_insertions: default_expected_insertions(),
            false_positive_rate: default_false_positive_rate(),
        }
    }
}

impl Default for HotKeyConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_interval_ms: default_retry_interval_ms(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl HotKeyConfig {
    /// Sleep between poll iterations.
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Lease TTL.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}
