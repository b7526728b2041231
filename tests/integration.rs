//! Integration tests for the cache engine.
//!
//! These require a real Redis and use testcontainers for portability; no
//! external docker-compose required.
//!
//! # Running Tests
//! ```bash
//! # Run all integration tests (requires Docker)
//! cargo test --test integration -- --ignored
//!
//! # Run only happy-path tests
//! cargo test --test integration happy -- --ignored
//!
//! # Run only failure scenario tests
//! cargo test --test integration failure -- --ignored
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: memoization, pipelined batch, leases
//! - `failure_*` - Failure scenarios: Redis death, availability transitions

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use tiercache::{
    BatchDescriptor, BoxError, CacheDescriptor, CacheEngine, CallContext, EngineConfig,
    MethodKey, MethodMetadata, RedisRemoteStore, RemoteStore, SimpleEvaluator,
};

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

// =============================================================================
// Container Helpers
// =============================================================================

fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

async fn engine_for(port: u16) -> CacheEngine {
    let config = EngineConfig {
        redis_url: Some(format!("redis://127.0.0.1:{port}")),
        ..Default::default()
    };
    CacheEngine::connect(config, Arc::new(SimpleEvaluator::new()))
        .await
        .expect("engine should connect to redis")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: i64,
    name: String,
}

fn user(id: i64) -> User {
    User { id, name: format!("user{id}") }
}

// =============================================================================
// Happy Path Tests - Normal Operation
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_memoization_through_redis() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let engine = engine_for(redis.get_host_port_ipv4(6379)).await;

    let desc = CacheDescriptor::new("user", "#id");
    let names = vec!["id".to_string()];
    let args = vec![json!(1)];
    let call = CallContext::new(&names, &args);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let c = calls.clone();
        let result: Option<User> = engine
            .get_or_load(&desc, &call, move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(Some(user(1)))
            })
            .await
            .unwrap();
        assert_eq!(result, Some(user(1)));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A second engine (cold local tiers, same Redis) is served by the
    // remote tier and promotes into its own local tier
    let other = engine_for(redis.get_host_port_ipv4(6379)).await;
    let result: Option<User> = other
        .get_or_load(&desc, &call, || async {
            Err::<Option<User>, BoxError>("loader must not run".into())
        })
        .await
        .unwrap();
    assert_eq!(result, Some(user(1)));
    assert!(other.tiers().local_for(&desc).contains("user::1"));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_pipelined_batch_roundtrip() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let engine = engine_for(redis.get_host_port_ipv4(6379)).await;

    let desc = BatchDescriptor::new("user", "#ids", "load_users");
    let method = MethodKey::new("UserService", "load_batch", &["Vec<i64>"]);
    engine
        .registry()
        .register(method.clone(), MethodMetadata::batch(desc, &["ids"]))
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let first: Vec<Option<User>> = engine
        .cached_batch_call(&method, &[json!([10, 11, 12])], move |missed| async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(
                missed.iter().filter_map(|v| v.as_i64()).map(user).collect::<Vec<_>>(),
            )
        })
        .await
        .unwrap();
    assert_eq!(first, vec![Some(user(10)), Some(user(11)), Some(user(12))]);

    // Everything is now in Redis: the second batch needs no loader
    let c = calls.clone();
    let second: Vec<Option<User>> = engine
        .cached_batch_call(&method, &[json!([10, 11, 12])], move |_missed| async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(Vec::<User>::new())
        })
        .await
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires Docker
async fn happy_hot_key_single_flight_over_redis_lease() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let engine = engine_for(redis.get_host_port_ipv4(6379)).await;
    engine.clear_all().await;

    let desc = Arc::new(CacheDescriptor {
        hot_key: true,
        ..CacheDescriptor::new("user", "#id")
    });
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        let desc = desc.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            let names = vec!["id".to_string()];
            let args = vec![json!(5)];
            let call = CallContext::new(&names, &args);
            let result: Option<User> = engine
                .get_or_load(&desc, &call, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, BoxError>(Some(user(5)))
                })
                .await
                .unwrap();
            result
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Some(user(5)));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Failure Scenarios
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_redis_death_degrades_to_local_tier() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let engine = engine_for(redis.get_host_port_ipv4(6379)).await;

    let desc = CacheDescriptor::new("user", "#id");
    let names = vec!["id".to_string()];
    let args = vec![json!(1)];
    let call = CallContext::new(&names, &args);

    // Populate while Redis is alive
    let result: Option<User> = engine
        .get_or_load(&desc, &call, || async { Ok::<_, BoxError>(Some(user(1))) })
        .await
        .unwrap();
    assert_eq!(result, Some(user(1)));
    assert!(engine.tiers().remote().is_available());

    // Kill Redis
    drop(redis);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The cached key is still served from the local tier
    let result: Option<User> = engine
        .get_or_load(&desc, &call, || async {
            Err::<Option<User>, BoxError>("loader must not run".into())
        })
        .await
        .unwrap();
    assert_eq!(result, Some(user(1)));

    // A new key regenerates: the remote write silently no-ops, the local
    // tier memoizes, and the failed operation flips availability
    let args = vec![json!(2)];
    let call = CallContext::new(&names, &args);
    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        let c = calls.clone();
        let result: Option<User> = engine
            .get_or_load(&desc, &call, move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(Some(user(2)))
            })
            .await
            .unwrap();
        assert_eq!(result, Some(user(2)));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!engine.tiers().remote().is_available());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_ping_tracks_availability() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let store = RedisRemoteStore::connect(&format!("redis://127.0.0.1:{port}"))
        .await
        .expect("connect");
    assert!(store.ping().await);
    assert!(store.is_available());

    drop(redis);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A failed probe flips the flag; a later successful probe would
    // restore it once the store returns
    assert!(!store.ping().await);
    assert!(!store.is_available());
    assert_eq!(store.get("user::1").await, None);
    assert!(!store.try_acquire_lease("hot_key_lock:user::1", Duration::from_secs(5)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires Docker
async fn failure_hot_key_misses_degrade_without_redis() {
    // Remote configured but dead from the start: lease acquisition fails,
    // availability flips, and callers regenerate concurrently (the
    // accepted degradation)
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);
    let engine = engine_for(port).await;
    drop(redis);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let desc = Arc::new(CacheDescriptor {
        hot_key: true,
        ..CacheDescriptor::new("user", "#id")
    });
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        let desc = desc.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            let names = vec!["id".to_string()];
            let args = vec![json!(9)];
            let call = CallContext::new(&names, &args);
            let result: Option<User> = engine
                .get_or_load(&desc, &call, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(Some(user(9)))
                })
                .await
                .unwrap();
            result
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Some(user(9)));
    }
    // Every caller still got an answer; duplicate loader work is allowed
    assert!(calls.load(Ordering::SeqCst) >= 1);
}
