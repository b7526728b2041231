// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Descriptor and parameter-name registry.
//!
//! Cached operations are discovered once, by whatever binding layer the
//! host uses (build-time codegen, proxies, explicit wrappers), and their
//! descriptors plus call-site parameter names are memoized here, keyed by
//! `(receiver type, method name, parameter types)`. Registration is
//! insert-once (first registration wins) and validates configuration;
//! lookup is a lock-free read on the hot path.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::descriptor::{BatchDescriptor, CacheDescriptor};
use crate::error::CacheError;

/// Identity of a cached operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub receiver: String,
    pub method: String,
    pub param_types: Vec<String>,
}

impl MethodKey {
    pub fn new(
        receiver: impl Into<String>,
        method: impl Into<String>,
        param_types: &[&str],
    ) -> Self {
        Self {
            receiver: receiver.into(),
            method: method.into(),
            param_types: param_types.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}({})", self.receiver, self.method, self.param_types.join(","))
    }
}

/// The descriptor kind bound to an operation.
#[derive(Debug, Clone)]
pub enum CacheBinding {
    Single(CacheDescriptor),
    Batch(BatchDescriptor),
}

/// Everything the engine needs to serve one cached operation.
#[derive(Debug, Clone)]
pub struct MethodMetadata {
    pub binding: CacheBinding,
    /// Call-site parameter names, positionally matching the argument
    /// vector; expressions reference arguments through these.
    pub param_names: Vec<String>,
}

impl MethodMetadata {
    pub fn single(descriptor: CacheDescriptor, param_names: &[&str]) -> Self {
        Self {
            binding: CacheBinding::Single(descriptor),
            param_names: param_names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn batch(descriptor: BatchDescriptor, param_names: &[&str]) -> Self {
        Self {
            binding: CacheBinding::Batch(descriptor),
            param_names: param_names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

/// Insert-once registry of cached-operation metadata.
///
/// The set is bounded by the program's declared cached operations, so there
/// is no eviction.
#[derive(Default)]
pub struct DescriptorRegistry {
    entries: DashMap<MethodKey, Arc<MethodMetadata>>,
}

impl DescriptorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cached operation. Validates the descriptor; a second
    /// registration under the same key keeps the first.
    pub fn register(
        &self,
        key: MethodKey,
        metadata: MethodMetadata,
    ) -> Result<Arc<MethodMetadata>, CacheError> {
        match &metadata.binding {
            CacheBinding::Single(desc) => desc.validate()?,
            CacheBinding::Batch(desc) => desc.validate()?,
        }

        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(method = %key, "registered cache binding");
                Arc::new(metadata)
            })
            .clone();
        Ok(entry)
    }

    /// Look up metadata for an operation.
    #[must_use]
    pub fn get(&self, key: &MethodKey) -> Option<Arc<MethodMetadata>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
