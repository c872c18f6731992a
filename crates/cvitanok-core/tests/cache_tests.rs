use std::time::Duration;

use cvitanok_core::CacheService;
use cvitanok_core::cache::{CacheBackend, DEFAULT_PREFIX, InMemoryCache};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    visits: u32,
}

// ═══ Strings ═══

#[tokio::test]
async fn test_get_set_del_exists() {
    let cache = CacheService::in_memory();
    assert_eq!(cache.prefix(), DEFAULT_PREFIX);

    assert_eq!(cache.get("greeting").await.unwrap(), None);
    cache.set("greeting", "hello", None).await.unwrap();
    assert_eq!(cache.get("greeting").await.unwrap().as_deref(), Some("hello"));
    assert!(cache.exists("greeting").await.unwrap());

    assert!(cache.del("greeting").await.unwrap());
    assert!(!cache.del("greeting").await.unwrap());
    assert!(!cache.exists("greeting").await.unwrap());
}

#[tokio::test]
async fn test_entries_expire() {
    let cache = CacheService::in_memory();
    cache
        .set("short", "lived", Some(Duration::from_millis(20)))
        .await
        .unwrap();
    cache.set("long", "lived", None).await.unwrap();
    assert!(cache.exists("short").await.unwrap());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!cache.exists("short").await.unwrap());
    assert_eq!(cache.get("short").await.unwrap(), None);
    assert_eq!(cache.get("long").await.unwrap().as_deref(), Some("lived"));
}

#[tokio::test]
async fn test_expired_entries_do_not_accumulate() {
    let backend = InMemoryCache::new();
    let cache = CacheService::new(backend.clone());
    for i in 0..1000 {
        cache
            .set(&format!("stale:{i}"), "x", Some(Duration::from_millis(1)))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    for i in 0..1000 {
        assert!(!cache.exists(&format!("stale:{i}")).await.unwrap());
    }
    assert!(backend.is_empty().await);

    for i in 0..1000 {
        cache
            .set(&format!("stale:{i}"), "x", Some(Duration::from_millis(1)))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    // Nothing reads the stale keys again; writing keeps the map bounded.
    for i in 0..100 {
        cache.set(&format!("fresh:{i}"), "y", None).await.unwrap();
    }
    assert_eq!(backend.len().await, 100);
    assert_eq!(cache.get("fresh:99").await.unwrap().as_deref(), Some("y"));
}

#[tokio::test]
async fn test_purge_expired() {
    let backend = InMemoryCache::new();
    backend
        .set("short", "lived", Some(Duration::from_millis(1)))
        .await
        .unwrap();
    backend.set("long", "lived", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(backend.purge_expired().await, 1);
    assert_eq!(backend.len().await, 1);
}

#[tokio::test]
async fn test_flush_clears_every_namespace() {
    let backend = InMemoryCache::new();
    let a = CacheService::new(backend.clone()).with_prefix("a");
    let b = CacheService::new(backend.clone()).with_prefix("b");
    a.set("k", "1", None).await.unwrap();
    b.set("k", "2", None).await.unwrap();

    a.flush().await.unwrap();
    assert_eq!(b.get("k").await.unwrap(), None);
    assert!(!backend.exists("a:k").await.unwrap());
}

// ═══ JSON ═══

#[tokio::test]
async fn test_json_helpers() {
    let cache = CacheService::in_memory();
    let profile = Profile {
        name: "ada".into(),
        visits: 3,
    };
    cache
        .set_json("profile:1", &profile, Some(Duration::from_secs(60)))
        .await
        .unwrap();

    let loaded: Option<Profile> = cache.get_json("profile:1").await.unwrap();
    assert_eq!(loaded, Some(profile));

    let missing: Option<Profile> = cache.get_json("profile:2").await.unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn test_json_helper_reports_garbage() {
    let cache = CacheService::in_memory();
    cache.set("profile:1", "not json", None).await.unwrap();
    assert!(cache.get_json::<Profile>("profile:1").await.is_err());
}

#[tokio::test]
async fn test_connect_without_url_uses_memory() {
    let cache = CacheService::connect(None).await;
    cache.set("k", "v", None).await.unwrap();
    assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
}
