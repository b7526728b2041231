// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache descriptors: the immutable per-operation caching policy.
//!
//! A [`CacheDescriptor`] is attached to a single cached operation at
//! discovery time and lives for the process. It carries everything the
//! engine needs to serve that operation: namespaces, key/condition/TTL
//! expressions, tier selection, codec switches, local-tier bounds, and the
//! hot-key switch. A [`BatchDescriptor`] is the collection-shaped variant
//! driving the pipelined batch path.

use std::time::Duration;

use crate::error::CacheError;

/// Eviction policy for a per-namespace local tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Least-recently-used first, bounded by `max_entries`.
    Lru,
    /// Least-frequently-used first (with aging), bounded by `max_entries`.
    Lfu,
    /// Insertion order, bounded by `max_entries`.
    Fifo,
    /// Lowest-weight first where weight = payload length, bounded by
    /// `max_weight_bytes`.
    Weight,
}

/// Which tiers participate in reads and writes for a descriptor.
///
/// A bit-set over {LOCAL, REMOTE}. Combine with `|`:
///
/// ```
/// use tiercache::CacheLayers;
///
/// let both = CacheLayers::LOCAL | CacheLayers::REMOTE;
/// assert_eq!(both, CacheLayers::BOTH);
/// assert!(both.has_local() && both.has_remote());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLayers(u8);

impl CacheLayers {
    const LOCAL_FLAG: u8 = 1;
    const REMOTE_FLAG: u8 = 2;

    /// In-process tier only.
    pub const LOCAL: CacheLayers = CacheLayers(Self::LOCAL_FLAG);
    /// Remote tier only.
    pub const REMOTE: CacheLayers = CacheLayers(Self::REMOTE_FLAG);
    /// Both tiers (the default).
    pub const BOTH: CacheLayers = CacheLayers(Self::LOCAL_FLAG | Self::REMOTE_FLAG);

    #[must_use]
    #[inline]
    pub fn has_local(self) -> bool {
        self.0 & Self::LOCAL_FLAG != 0
    }

    #[must_use]
    #[inline]
    pub fn has_remote(self) -> bool {
        self.0 & Self::REMOTE_FLAG != 0
    }
}

impl std::ops::BitOr for CacheLayers {
    type Output = CacheLayers;

    fn bitor(self, rhs: CacheLayers) -> CacheLayers {
        CacheLayers(self.0 | rhs.0)
    }
}

/// Caching policy for a single-result operation.
///
/// Immutable after construction. [`CacheDescriptor::new`] fills every field
/// with the framework defaults; override with struct-update syntax:
///
/// ```
/// use std::time::Duration;
/// use tiercache::CacheDescriptor;
///
/// let desc = CacheDescriptor {
///     ttl_remote: Duration::from_secs(60),
///     hot_key: true,
///     ..CacheDescriptor::new("user", "#id")
/// };
/// assert_eq!(desc.logical_names[0], "user");
/// ```
#[derive(Debug, Clone)]
pub struct CacheDescriptor {
    /// Ordered namespaces; `logical_names[0]` is the active one and prefixes
    /// every key.
    pub logical_names: Vec<String>,
    /// Expression producing the per-call key suffix from the arguments.
    pub key_expr: String,
    /// Optional boolean gate; when it evaluates false, the call bypasses
    /// caching entirely.
    pub condition_expr: Option<String>,

    /// Default remote-tier TTL.
    pub ttl_remote: Duration,
    /// Optional dynamic TTL expression, evaluated against the arguments.
    /// A positive result wins over every other source.
    pub ttl_expr: Option<String>,
    /// Optional result field holding an absolute expiry as epoch seconds;
    /// a positive remaining lifetime wins over `ttl_remote`.
    pub ttl_field: Option<String>,
    /// Local-tier TTL, fixed at the namespace tier's construction.
    pub ttl_local: Duration,

    /// Which tiers serve this descriptor.
    pub layers: CacheLayers,

    /// Compress payloads at or above `compress_threshold` bytes.
    pub compress: bool,
    pub compress_threshold: usize,

    /// Local-tier bounds.
    pub eviction_policy: EvictionPolicy,
    pub max_entries: u64,
    pub max_weight_bytes: u64,

    /// Oversize-key policy: keys longer than `max_key_bytes` either bypass
    /// the cache (`reject_oversize_key`) or proceed with a warning.
    pub max_key_bytes: usize,
    pub reject_oversize_key: bool,

    /// Memoize null results under the reserved marker byte. When false,
    /// nulls are not written and reads consult the negative-lookup filter.
    pub cache_nulls: bool,

    /// Enable the hot-key single-flight protocol on misses.
    pub hot_key: bool,
}

impl CacheDescriptor {
    /// Create a descriptor with the framework defaults: both tiers, 1 h
    /// remote / 10 min local TTL, LRU over 10 000 entries, no compression,
    /// 256-byte key limit, nulls memoized, single-flight off.
    pub fn new(logical_name: impl Into<String>, key_expr: impl Into<String>) -> Self {
        Self {
            logical_names: vec![logical_name.into()],
            key_expr: key_expr.into(),
            condition_expr: None,
            ttl_remote: Duration::from_secs(3600),
            ttl_expr: None,
            ttl_field: None,
            ttl_local: Duration::from_secs(600),
            layers: CacheLayers::BOTH,
            compress: false,
            compress_threshold: 1024,
            eviction_policy: EvictionPolicy::Lru,
            max_entries: 10_000,
            max_weight_bytes: 10 * 1024 * 1024,
            max_key_bytes: 256,
            reject_oversize_key: false,
            cache_nulls: true,
            hot_key: false,
        }
    }

    /// The active namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.logical_names[0]
    }

    /// Build the fully-qualified key for an evaluated suffix.
    #[must_use]
    pub fn qualified_key(&self, suffix: &str) -> String {
        format!("{}::{}", self.namespace(), suffix)
    }

    pub(crate) fn validate(&self) -> Result<(), CacheError> {
        if self.logical_names.is_empty() || self.logical_names[0].is_empty() {
            return Err(CacheError::Configuration(
                "descriptor requires at least one non-empty logical name".into(),
            ));
        }
        if self.key_expr.is_empty() {
            return Err(CacheError::Configuration(
                "descriptor requires a key expression".into(),
            ));
        }
        Ok(())
    }
}

/// Caching policy for a batch operation over a collection of identifiers.
///
/// The batch path targets the remote tier only, so the local-tier knobs of
/// [`CacheDescriptor`] do not appear here. The decoding target type is the
/// generic parameter at the call site.
#[derive(Debug, Clone)]
pub struct BatchDescriptor {
    /// Ordered namespaces; `logical_names[0]` prefixes every key.
    pub logical_names: Vec<String>,
    /// Per-item key expression. Must reference exactly one collection-typed
    /// argument (the pivot); it is re-evaluated with the pivot rebound to
    /// each element in turn.
    pub item_key_expr: String,
    /// Name of the bulk loader on the same receiver, taking the missed
    /// identifier sequence. Resolved by the binding layer; recorded here for
    /// validation and diagnostics.
    pub bulk_loader: String,

    /// Remote TTL applied by the pipelined write-back.
    pub ttl_remote: Duration,

    pub compress: bool,
    pub compress_threshold: usize,

    pub max_key_bytes: usize,
}

impl BatchDescriptor {
    pub fn new(
        logical_name: impl Into<String>,
        item_key_expr: impl Into<String>,
        bulk_loader: impl Into<String>,
    ) -> Self {
        Self {
            logical_names: vec![logical_name.into()],
            item_key_expr: item_key_expr.into(),
            bulk_loader: bulk_loader.into(),
            ttl_remote: Duration::from_secs(3600),
            compress: false,
            compress_threshold: 1024,
            max_key_bytes: 256,
        }
    }

    /// The active namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.logical_names[0]
    }

    /// Build the fully-qualified key for an evaluated suffix.
    #[must_use]
    pub fn qualified_key(&self, suffix: &str) -> String {
        format!("{}::{}", self.namespace(), suffix)
    }

    pub(crate) fn validate(&self) -> Result<(), CacheError> {
        if self.logical_names.is_empty() || self.logical_names[0].is_empty() {
            return Err(CacheError::Configuration(
                "batch descriptor requires at least one non-empty logical name".into(),
            ));
        }
        if self.item_key_expr.is_empty() {
            return Err(CacheError::Configuration(
                "batch descriptor requires an item key expression".into(),
            ));
        }
        if self.bulk_loader.is_empty() {
            return Err(CacheError::Configuration(
                "batch descriptor requires a bulk loader name".into(),
            ));
        }
        Ok(())
    }
}
