// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch read-through over a collection of identifiers.
//!
//! The pipeline fans the identifier list out through the remote tier in a
//! single pipelined round-trip, regenerates only the misses via the
//! user-supplied bulk loader, writes the fresh results back through one
//! pipelined round-trip, and merges everything in input order. The local
//! tier does not participate: pipelined remote I/O keeps the semantics
//! simple and the round-trips bounded.
//!
//! Key projection is "smart": the item-key expression is re-evaluated once
//! per element with the pivot variable rebound to that element, so
//! expressions like `#tenant + '::' + #ids` yield distinct keys per
//! element while static prefixes stay stable.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::CacheEngine;
use crate::codec;
use crate::descriptor::BatchDescriptor;
use crate::error::{BoxError, CacheError};
use crate::expr::{self, CallContext};
use crate::metrics;

/// One projected input position: the element and its canonical id string.
struct Slot {
    id: String,
    element: Value,
}

impl CacheEngine {
    /// Descriptor-driven batch read-through.
    ///
    /// The result is aligned to the input identifier sequence in both
    /// length and order; positions with neither a cached nor a loaded
    /// result are `None`. The bulk loader is invoked at most once, with the
    /// missed identifiers.
    #[tracing::instrument(skip_all, fields(namespace = %desc.namespace()))]
    pub async fn get_or_load_batch<T, L, Fut>(
        &self,
        desc: &BatchDescriptor,
        call: &CallContext<'_>,
        bulk_loader: L,
    ) -> Result<Vec<Option<T>>, CacheError>
    where
        T: Serialize + DeserializeOwned + Clone,
        L: FnOnce(Vec<Value>) -> Fut,
        Fut: Future<Output = Result<Vec<T>, BoxError>>,
    {
        let _timer = metrics::LatencyTimer::new("get_or_load_batch");

        // 1. Pivot: the unique collection argument the expression references
        let Some((pivot, ids)) = find_pivot(&desc.item_key_expr, call) else {
            warn!(
                expr = %desc.item_key_expr,
                "item key expression references no collection argument, returning empty batch"
            );
            return Ok(Vec::new());
        };
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // 2. Projection: rebind the pivot to each element in turn. Null
        // identifiers are skipped here but keep their output position.
        let ctx = call.eval_context();
        let mut slots: Vec<Option<Slot>> = Vec::with_capacity(ids.len());
        let mut key_of: HashMap<String, String> = HashMap::new();
        for element in ids {
            if element.is_null() {
                slots.push(None);
                continue;
            }
            let rebound = ctx.rebound(pivot, element);
            let value = self.evaluator.evaluate(&desc.item_key_expr, &rebound).map_err(|e| {
                CacheError::KeyExpression {
                    expr: desc.item_key_expr.clone(),
                    reason: e.to_string(),
                }
            })?;
            let key = desc.qualified_key(&expr::key_string(&value));
            if key.len() > desc.max_key_bytes {
                warn!(key = %key, max_key_bytes = desc.max_key_bytes, "oversize batch key");
            }
            let id = expr::key_string(element);
            key_of.entry(id.clone()).or_insert(key);
            slots.push(Some(Slot { id, element: element.clone() }));
        }

        // 3. Bulk read: one pipelined round-trip against the remote tier
        let keys: Vec<String> = {
            let mut seen = HashSet::new();
            slots
                .iter()
                .flatten()
                .filter(|slot| seen.insert(slot.id.clone()))
                .map(|slot| key_of[&slot.id].clone())
                .collect()
        };
        let remote = self.tiers.remote();
        let cached_bytes = remote.multi_get(&keys).await;

        let mut cached: HashMap<String, T> = HashMap::new();
        for slot in slots.iter().flatten() {
            if cached.contains_key(&slot.id) {
                continue;
            }
            let Some(bytes) = cached_bytes.get(&key_of[&slot.id]) else {
                continue;
            };
            if codec::is_null_marker(bytes) {
                continue;
            }
            match codec::decode::<T>(bytes) {
                Ok(value) => {
                    cached.insert(slot.id.clone(), value);
                }
                Err(e) => {
                    warn!(key = %key_of[&slot.id], error = %e, "batch entry undecodable, treating as miss");
                }
            }
        }

        // 4. Miss set, input order, deduplicated
        let mut seen = HashSet::new();
        let missed: Vec<Value> = slots
            .iter()
            .flatten()
            .filter(|slot| !cached.contains_key(&slot.id) && seen.insert(slot.id.clone()))
            .map(|slot| slot.element.clone())
            .collect();

        metrics::record_batch(desc.namespace(), ids.len(), cached.len(), missed.len());
        debug!(ids = ids.len(), hits = cached.len(), missed = missed.len(), "batch fan-out");

        // 5. Bulk regenerate + 6. bulk write
        let mut fresh: HashMap<String, T> = HashMap::new();
        if !missed.is_empty() {
            metrics::record_loader_call(desc.namespace());
            let items = bulk_loader(missed).await.map_err(CacheError::Loader)?;

            let mut to_write: Vec<(String, Vec<u8>)> = Vec::with_capacity(items.len());
            for item in items {
                let Some(id) = extract_id(&item) else {
                    warn!("bulk loader item has no extractable id field, dropping");
                    continue;
                };
                if fresh.contains_key(&id) {
                    // Duplicate id from the loader: keep the first
                    continue;
                }
                let Some(key) = key_of.get(&id) else {
                    warn!(id = %id, "bulk loader returned an unrequested id, dropping");
                    continue;
                };
                match codec::encode(&item, desc.compress, desc.compress_threshold) {
                    Ok(bytes) => to_write.push((key.clone(), bytes)),
                    Err(e) => {
                        warn!(key = %key, error = %e, "encode failed, item returned uncached");
                    }
                }
                fresh.insert(id, item);
            }

            if !to_write.is_empty() {
                remote.multi_put(&to_write, self.batch_ttl(desc)).await;
            }
        }

        // 7. Merge, preserving input order and length
        Ok(slots
            .into_iter()
            .map(|slot| {
                slot.and_then(|s| {
                    cached.get(&s.id).cloned().or_else(|| fresh.get(&s.id).cloned())
                })
            })
            .collect())
    }

    fn batch_ttl(&self, desc: &BatchDescriptor) -> Duration {
        if desc.ttl_remote > Duration::ZERO {
            desc.ttl_remote
        } else {
            Duration::from_secs(self.config.default_expire_secs)
        }
    }
}

/// Find the pivot argument: the first collection-typed argument the
/// expression references by name.
fn find_pivot<'a>(item_key_expr: &str, call: &CallContext<'a>) -> Option<(&'a str, &'a [Value])> {
    for (name, value) in call.param_names.iter().zip(call.args.iter()) {
        if let Value::Array(items) = value {
            if item_key_expr.contains(&format!("#{name}")) {
                return Some((name.as_str(), items.as_slice()));
            }
        }
    }
    None
}

/// Extract an item's `id` field through its serialized form, canonicalized
/// to the same string form used for key projection.
fn extract_id<T: Serialize>(item: &T) -> Option<String> {
    let value = serde_json::to_value(item).ok()?;
    let id = value.get("id")?;
    if id.is_null() {
        return None;
    }
    Some(expr::key_string(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn find_pivot_picks_referenced_collection() {
        let names = vec!["region".to_string(), "ids".to_string()];
        let args = vec![json!("eu"), json!([1, 2])];
        let call = CallContext::new(&names, &args);

        let (name, items) = find_pivot("#region + '::' + #ids", &call).unwrap();
        assert_eq!(name, "ids");
        assert_eq!(items, &[json!(1), json!(2)]);
    }

    #[test]
    fn find_pivot_ignores_unreferenced_collections() {
        let names = vec!["ids".to_string()];
        let args = vec![json!([1, 2])];
        let call = CallContext::new(&names, &args);
        assert!(find_pivot("#other", &call).is_none());
    }

    #[test]
    fn find_pivot_requires_a_collection() {
        let names = vec!["id".to_string()];
        let args = vec![json!(5)];
        let call = CallContext::new(&names, &args);
        assert!(find_pivot("#id", &call).is_none());
    }

    #[test]
    fn extract_id_from_struct() {
        #[derive(serde::Serialize)]
        struct Item {
            id: u64,
            name: &'static str,
        }
        assert_eq!(extract_id(&Item { id: 9, name: "x" }), Some("9".to_string()));
    }

    #[test]
    fn extract_id_missing_or_null() {
        assert_eq!(extract_id(&json!({"name": "x"})), None);
        assert_eq!(extract_id(&json!({"id": null})), None);
    }
}
