// Two-tier blob cache ordering and fallthrough.

mod common;

use bundler_storage::cache::BlobCache;
use bundler_storage::error::StorageError;
use bundler_storage::retry::RetryingStore;
use bundler_storage::traits::ObjectStore;
use bundler_storage::volatile::VolatileTier;
use bytes::Bytes;
use common::{FailureMode, FlakyStore, MemoryStore, RecordingVolatile, seeded_bytes};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_get_after_set_served_from_volatile() {
    let durable = MemoryStore::new();
    let volatile = RecordingVolatile::new();
    let cache = BlobCache::new(durable.clone(), Some(volatile.clone()));
    let ns = cache.namespace("app", None);

    let data = seeded_bytes(1, 4096);
    ns.set("h1", data.clone()).await.unwrap();
    assert_eq!(ns.get("h1").await.unwrap(), data);

    assert_eq!(volatile.hits(), 1);
    assert_eq!(durable.gets(), 0, "durable tier should not be read on a hit");
}

#[tokio::test]
async fn test_set_get_with_volatile_disabled() {
    let durable = MemoryStore::new();
    let ns = BlobCache::durable_only(durable.clone()).namespace("app", Some("sub-1"));

    ns.set("h1", Bytes::from("content")).await.unwrap();
    assert_eq!(ns.get("h1").await.unwrap(), Bytes::from("content"));
    assert!(durable.contains("app/sub-1/h1"));
}

#[tokio::test]
async fn test_durable_failure_leaves_volatile_untouched() {
    let flaky = FlakyStore::new(usize::MAX, FailureMode::Transient);
    let volatile = RecordingVolatile::new();
    let cache = BlobCache::new(flaky, Some(volatile.clone()));

    let err = cache.set("app/h1", Bytes::from("x")).await.unwrap_err();

    assert!(matches!(err, StorageError::Io(_)));
    assert_eq!(volatile.sets.load(Ordering::SeqCst), 0);
    assert!(!volatile.contains("app/h1"));
}

#[tokio::test]
async fn test_volatile_write_failure_propagates_after_durable_write() {
    let durable = MemoryStore::new();
    let volatile = RecordingVolatile::new();
    volatile.fail_sets.store(true, Ordering::SeqCst);
    let cache = BlobCache::new(durable.clone(), Some(volatile));

    let err = cache.set("app/h1", Bytes::from("x")).await.unwrap_err();

    assert!(matches!(err, StorageError::Volatile(_)));
    assert!(durable.contains("app/h1"), "durable write happens first");
}

#[tokio::test]
async fn test_missing_blob_is_not_negatively_cached() {
    let durable = MemoryStore::new();
    let volatile = RecordingVolatile::new();
    let cache = BlobCache::new(durable.clone(), Some(volatile.clone()));

    assert!(cache.get("app/h1").await.unwrap_err().is_not_found());
    assert!(!volatile.contains("app/h1"));

    durable.put("app/h1", Bytes::from("late")).await.unwrap();
    assert_eq!(cache.get("app/h1").await.unwrap(), Bytes::from("late"));
}

#[tokio::test]
async fn test_delete_propagates_durable_error() {
    let durable = MemoryStore::new();
    let volatile = RecordingVolatile::new();
    volatile.set("app/h1", Bytes::from("stale")).await.unwrap();
    let cache = BlobCache::new(durable, Some(volatile.clone()));

    assert!(cache.delete("app/h1").await.unwrap_err().is_not_found());
    assert!(
        volatile.contains("app/h1"),
        "volatile tier is only touched after the durable delete succeeds"
    );
}

#[tokio::test]
async fn test_delete_removes_both_tiers() {
    let durable = MemoryStore::new();
    let volatile = RecordingVolatile::new();
    let cache = BlobCache::new(durable.clone(), Some(volatile.clone()));

    cache.set("app/h1", Bytes::from("x")).await.unwrap();
    cache.delete("app/h1").await.unwrap();

    assert!(!durable.contains("app/h1"));
    assert!(!volatile.contains("app/h1"));
}

#[tokio::test]
async fn test_retrying_durable_tier_behind_cache() {
    let flaky = FlakyStore::new(2, FailureMode::Transient);
    let durable: Arc<dyn ObjectStore> =
        Arc::new(RetryingStore::new(flaky.clone(), 3, Duration::ZERO));
    let cache = BlobCache::durable_only(durable);

    cache.set("app/h1", Bytes::from("x")).await.unwrap();
    assert_eq!(cache.get("app/h1").await.unwrap(), Bytes::from("x"));
    assert_eq!(flaky.calls(), 4);
}

#[tokio::test]
async fn test_concurrent_sets_to_distinct_keys() {
    let durable = MemoryStore::new();
    let volatile = RecordingVolatile::new();
    let cache = BlobCache::new(durable.clone(), Some(volatile));

    let mut handles = Vec::new();
    for i in 0..32u64 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            let ns = cache.namespace("app", None);
            let data = seeded_bytes(i, 256);
            ns.set(&format!("h{i}"), data.clone()).await.unwrap();
            assert_eq!(ns.get(&format!("h{i}")).await.unwrap(), data);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for i in 0..32u64 {
        assert!(durable.exists(&format!("app/h{i}")).await.unwrap());
    }
}
