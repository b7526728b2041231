// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Errors surfaced by the cache engine.
//!
//! Only pre-cache faults (misconfiguration, key/condition expression
//! failures) and user-loader failures are surfaced to callers. Everything
//! else (remote I/O, codec, TTL-expression, oversize-key faults) is
//! absorbed: an unreadable cache behaves as a miss, an unwritable cache
//! behaves as not-cached.

use thiserror::Error;

/// Boxed error type carried by user-supplied loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum CacheError {
    /// A descriptor failed validation at registration, or a required piece
    /// of binding metadata is missing. Fatal for the call.
    #[error("cache binding misconfigured: {0}")]
    Configuration(String),

    /// The key expression could not be evaluated. Fatal for the call: a
    /// broken key is a misconfiguration, not a cache miss.
    #[error("key expression '{expr}' failed: {reason}")]
    KeyExpression { expr: String, reason: String },

    /// The condition expression could not be evaluated.
    #[error("condition expression '{expr}' failed: {reason}")]
    ConditionExpression { expr: String, reason: String },

    /// The user loader failed. Propagated as-is; no cache write occurred.
    #[error("loader failed: {0}")]
    Loader(#[source] BoxError),

    /// No binding is registered under the given method key.
    #[error("no cache binding registered for {0}")]
    UnknownMethod(String),
}
