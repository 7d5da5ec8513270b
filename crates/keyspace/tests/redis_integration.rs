//! Redis integration tests
//!
//! Run with:
//!
//! ```bash
//! cargo test -p keyspace --test redis_integration -- --test-threads=1
//! ```

use std::{sync::Arc, time::Duration};

use keyspace::{
    IdempotencyCache, KeyValueStore, LockError, LockManager, ReadCache, RedisKeyValueStore,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Redis>,
    url: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Redis::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(6379).await.unwrap();

            Arc::new(ContainerInfo {
                container,
                url: format!("redis://{host}:{port}"),
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> RedisKeyValueStore {
    let info = get_container_info().await;
    let store = RedisKeyValueStore::connect(&info.url).await.unwrap();
    store.delete_pattern("*").await.unwrap();
    store
}

const TTL: Duration = Duration::from_secs(10);

#[tokio::test]
async fn set_if_absent_and_conditional_ops() {
    let store = get_test_store().await;

    assert!(store.set_if_absent("k", "mine", TTL).await.unwrap());
    assert!(!store.set_if_absent("k", "theirs", TTL).await.unwrap());
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("mine"));

    assert!(!store.compare_and_expire("k", "theirs", TTL).await.unwrap());
    assert!(store.compare_and_expire("k", "mine", TTL).await.unwrap());

    assert!(!store.compare_and_delete("k", "theirs").await.unwrap());
    assert!(store.compare_and_delete("k", "mine").await.unwrap());
    assert!(!store.exists("k").await.unwrap());
}

#[tokio::test]
async fn short_ttl_expires_on_the_server() {
    let store = get_test_store().await;

    store
        .set("short", "v", Duration::from_millis(50))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(store.get("short").await.unwrap().is_none());
}

#[tokio::test]
async fn delete_pattern_scans_all_batches() {
    let store = get_test_store().await;

    for i in 0..250 {
        store.set(&format!("items:{i}"), "v", TTL).await.unwrap();
    }
    store.set("lock:items:1", "owner", TTL).await.unwrap();

    assert_eq!(store.delete_pattern("items:*").await.unwrap(), 250);
    assert!(store.exists("lock:items:1").await.unwrap());
}

#[tokio::test]
async fn lock_contention_across_connections() {
    let info = get_container_info().await;
    let first = LockManager::new(get_test_store().await);
    let second = LockManager::new(RedisKeyValueStore::connect(&info.url).await.unwrap());

    let token = first.acquire("items:42", TTL).await.unwrap();
    assert!(matches!(
        second.acquire("items:42", TTL).await,
        Err(LockError::Busy { .. })
    ));

    first.release("items:42", &token).await.unwrap();
    second.acquire("items:42", TTL).await.unwrap();
}

#[tokio::test]
async fn idempotency_and_read_cache_round_trip() {
    let store = get_test_store().await;
    let idempotency = IdempotencyCache::new(store.clone());
    let cache = ReadCache::new(store);

    assert!(
        idempotency
            .store("reservation:abc", &vec!["r1".to_string()], TTL)
            .await
            .unwrap()
    );
    let replay: Option<Vec<String>> = idempotency.lookup("reservation:abc").await.unwrap();
    assert_eq!(replay, Some(vec!["r1".to_string()]));

    cache.put("items:list", &vec![1, 2], TTL).await;
    assert_eq!(cache.get::<Vec<i32>>("items:list").await, Some(vec![1, 2]));
    assert_eq!(cache.invalidate("items:*").await, 1);
    assert!(cache.get::<Vec<i32>>("items:list").await.is_none());
}
