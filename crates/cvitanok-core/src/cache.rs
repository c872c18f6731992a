use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;

use crate::error::AppError;

/// Key prefix of the application cache.
pub const DEFAULT_PREFIX: &str = "cvitanok-cache";

/// Storage behind a [`CacheService`].
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Store `value`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError>;

    /// Returns `true` if the key existed.
    async fn del(&self, key: &str) -> Result<bool, AppError>;

    async fn exists(&self, key: &str) -> Result<bool, AppError>;

    /// Drop every key of the backend, not only the prefixed ones.
    async fn flush(&self) -> Result<(), AppError>;
}

/// Namespaced cache with JSON helpers.
///
/// Handlers receive it through the `Cache` capability:
///
/// ```rust,ignore
/// async fn get_user(deps: Inject<(DbSession, Cache)>, Path(id): Path<i32>) -> Result<Json<UserRead>, AppError> {
///     deps.run(|(db, cache)| async move {
///         let key = format!("user:{id}");
///         if let Some(hit) = cache.get_json::<UserRead>(&key).await? {
///             return Ok(Json(hit));
///         }
///         let user = load(&db, id).await?;
///         cache.set_json(&key, &user, Some(Duration::from_secs(300))).await?;
///         Ok(Json(user))
///     })
///     .await
/// }
/// ```
#[derive(Clone)]
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
    prefix: Arc<str>,
}

impl CacheService {
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        CacheService {
            backend: Arc::new(backend),
            prefix: Arc::from(DEFAULT_PREFIX),
        }
    }

    /// In-memory cache, for development and tests.
    pub fn in_memory() -> Self {
        CacheService::new(InMemoryCache::new())
    }

    /// Connect to `url` when it is set, falling back to memory.
    ///
    /// Without the `redis` feature the URL is ignored.
    pub async fn connect(url: Option<&str>) -> Self {
        #[cfg(feature = "redis")]
        if let Some(url) = url {
            match RedisCache::new(url).await {
                Ok(redis_cache) => {
                    tracing::info!("redis cache connected");
                    return CacheService::new(redis_cache);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "redis connection failed, falling back to in-memory cache");
                }
            }
        }
        #[cfg(not(feature = "redis"))]
        if url.is_some() {
            tracing::debug!("redis feature disabled, ignoring cache URL");
        }
        tracing::info!("using in-memory cache");
        CacheService::in_memory()
    }

    /// Same backend, different namespace.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Arc::from(prefix);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.backend.get(&self.key(key)).await? {
            Some(raw) => {
                let value: T = serde_json::from_str(&raw)
                    .map_err(|e| AppError::Internal(format!("Cache deserialize error: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), AppError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| AppError::Internal(format!("Cache serialize error: {}", e)))?;
        self.backend.set(&self.key(key), &raw, ttl).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.backend.get(&self.key(key)).await
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        self.backend.set(&self.key(key), value, ttl).await
    }

    pub async fn del(&self, key: &str) -> Result<bool, AppError> {
        self.backend.del(&self.key(key)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, AppError> {
        self.backend.exists(&self.key(key)).await
    }

    pub async fn flush(&self) -> Result<(), AppError> {
        self.backend.flush().await
    }
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

// ── In-memory backend ──

/// Stored entries at which `set` first sweeps out expired ones.
const SWEEP_THRESHOLD: usize = 1024;

/// `HashMap` behind a `RwLock`.
///
/// Expired entries are dropped when read, and swept in bulk by `set` once the
/// map grows past twice its size after the previous sweep (at least
/// [`SWEEP_THRESHOLD`]), so keys nobody reads again do not pile up.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
    sweep_at: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored entries, counting expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry, returning how many went.
    pub async fn purge_expired(&self) -> usize {
        let mut store = self.store.write().await;
        self.sweep(&mut store)
    }

    fn sweep(&self, store: &mut HashMap<String, CacheEntry>) -> usize {
        let before = store.len();
        store.retain(|_, entry| !entry.is_expired());
        self.sweep_at.store(store.len() * 2, Ordering::Relaxed);
        let purged = before - store.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = store.len(), "swept expired cache entries");
        }
        purged
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let store = self.store.read().await;
        match store.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(store);
                self.store.write().await.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        let mut store = self.store.write().await;
        store.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        if store.len() >= SWEEP_THRESHOLD.max(self.sweep_at.load(Ordering::Relaxed)) {
            self.sweep(&mut store);
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.store.write().await.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(CacheBackend::get(self, key).await?.is_some())
    }

    async fn flush(&self) -> Result<(), AppError> {
        self.store.write().await.clear();
        Ok(())
    }
}

// ── Redis backend ──

/// Redis-backed cache (`redis` feature).
///
/// ```rust,ignore
/// let cache = CacheService::new(RedisCache::new("redis://127.0.0.1:6379").await?);
/// ```
#[cfg(feature = "redis")]
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

#[cfg(feature = "redis")]
impl RedisCache {
    pub async fn new(url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(url)
            .map_err(|e| AppError::ServiceUnavailable(format!("Redis connection error: {}", e)))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("Redis connection error: {}", e)))?;
        Ok(RedisCache { conn })
    }
}

#[cfg(feature = "redis")]
fn redis_error(op: &str, e: redis::RedisError) -> AppError {
    AppError::ServiceUnavailable(format!("Redis {} error: {}", op, e))
}

#[cfg(feature = "redis")]
#[async_trait::async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| redis_error("GET", e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex(key, value, ttl.as_secs().max(1))
                .await
                .map_err(|e| redis_error("SETEX", e)),
            None => conn.set(key, value).await.map_err(|e| redis_error("SET", e)),
        }
    }

    async fn del(&self, key: &str) -> Result<bool, AppError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let count: i64 = conn.del(key).await.map_err(|e| redis_error("DEL", e))?;
        Ok(count > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(|e| redis_error("EXISTS", e))
    }

    async fn flush(&self) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("FLUSHDB", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prefixes_isolate_namespaces() {
        let backend = InMemoryCache::new();
        let users = CacheService::new(backend.clone()).with_prefix("users");
        let posts = CacheService::new(backend.clone()).with_prefix("posts");

        users.set("1", "alice", None).await.unwrap();
        assert_eq!(users.get("1").await.unwrap().as_deref(), Some("alice"));
        assert_eq!(posts.get("1").await.unwrap(), None);
        assert!(backend.exists("users:1").await.unwrap());
    }
}
