//! # tiercache
//!
//! A two-tier, descriptor-driven method-result caching engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Binding Layer (host)                    │
//! │  • Maps an intercepted call to (method key, args, loader)  │
//! │  • Registers descriptors once at discovery time            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CacheEngine                          │
//! │  • Condition / key / TTL expressions via Evaluator         │
//! │  • Negative-lookup filter to stop cache penetration        │
//! │  • Hot-key single-flight via remote lease                  │
//! │  • Batch fan-out with pipelined remote I/O                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Local Tier (per namespace)                 │
//! │  • DashMap, write-time TTL                                 │
//! │  • LRU / LFU / FIFO / WEIGHT eviction                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    (promotion on remote hits)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Remote Tier (optional)                    │
//! │  • Redis: pipelined batch I/O, SET NX EX leases            │
//! │  • Health-tracked; degrades to local on failure            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use tiercache::{
//!     CacheDescriptor, CacheEngine, CallContext, EngineConfig,
//!     MemoryRemoteStore, SimpleEvaluator,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = CacheEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(MemoryRemoteStore::new()),
//!     Arc::new(SimpleEvaluator::new()),
//! );
//!
//! // One descriptor per cached operation, built at discovery time
//! let desc = CacheDescriptor::new("user", "#id");
//!
//! let param_names = vec!["id".to_string()];
//! let args = vec![json!(1)];
//! let call = CallContext::new(&param_names, &args);
//!
//! // First call runs the loader and memoizes; the second is served from
//! // the cache without touching the loader
//! let user: Option<String> = engine
//!     .get_or_load(&desc, &call, || async {
//!         Ok::<_, tiercache::BoxError>(Some("Alice".to_string()))
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(user.as_deref(), Some("Alice"));
//! # }
//! ```
//!
//! ## Features
//!
//! - **Two-tier reads**: local first, remote with promotion, graceful
//!   degradation when the remote store is absent or down
//! - **Negative-lookup shield**: per-namespace approximate-membership
//!   filters short-circuit identifiers never observed as present
//! - **Hot-key single-flight**: a remote lease elects one regenerator per
//!   key; losers poll for the winner's write
//! - **Batch pipeline**: multi-get, bulk-load the misses, multi-put, merge
//!   in input order: two transport round-trips regardless of batch size
//! - **Expression-driven policy**: keys, conditions, and TTLs come from
//!   opaque expressions evaluated by an injected [`Evaluator`]
//!
//! ## Modules
//!
//! - [`engine`]: the [`CacheEngine`] orchestrating all components
//! - [`descriptor`]: per-operation caching policy
//! - [`local`] / [`remote`] / [`tiers`]: the storage tiers and their
//!   coordinator
//! - [`filter`]: negative-lookup filters
//! - [`codec`]: serialization and gzip framing
//! - [`expr`]: expression contract and the bundled dialect
//! - [`registry`]: descriptor and parameter-name resolution

pub mod codec;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod expr;
pub mod filter;
pub mod local;
pub mod metrics;
pub mod registry;
pub mod remote;
pub mod tiers;

pub use config::{BloomConfig, EngineConfig, HotKeyConfig};
pub use descriptor::{BatchDescriptor, CacheDescriptor, CacheLayers, EvictionPolicy};
pub use engine::CacheEngine;
pub use error::{BoxError, CacheError};
pub use expr::{CallContext, EvalContext, EvalError, Evaluator, SimpleEvaluator};
pub use filter::NegativeLookupFilter;
pub use local::LocalCache;
pub use registry::{CacheBinding, DescriptorRegistry, MethodKey, MethodMetadata};
pub use remote::{
    spawn_health_probe, MemoryRemoteStore, NoopRemoteStore, RedisRemoteStore, RemoteStore,
};
pub use tiers::TierCoordinator;
