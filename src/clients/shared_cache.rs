//! Shared cache for opaque service coordination (spec.md §5 "A shared cache
//! is used for opaque service coordination (warming locks, processed-job
//! ids for idempotency); TTLs bound leakage.").
//!
//! Grounded in the teacher's `storage::redis` backend style (`redis::aio::
//! ConnectionManager` + `AsyncCommands`), scoped down to the handful of
//! primitives this core actually needs: a TTL'd lock and a TTL'd key-value
//! set.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

#[derive(Debug, thiserror::Error)]
pub enum SharedCacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[async_trait]
pub trait SharedCache: Send + Sync {
    /// spec.md §5 "worker coordinator" mutex: `SET key value NX EX ttl`,
    /// returns `true` if the lock was acquired.
    async fn try_acquire_lock(&self, key: &str, ttl_secs: u64) -> Result<bool, SharedCacheError>;
    async fn release_lock(&self, key: &str) -> Result<(), SharedCacheError>;

    /// Processed-job idempotency marker: returns `true` if `key` was not
    /// already present (i.e. this call claimed it).
    async fn mark_processed_if_absent(&self, key: &str, ttl_secs: u64) -> Result<bool, SharedCacheError>;
}

pub struct RedisSharedCache {
    conn: ConnectionManager,
}

impl RedisSharedCache {
    pub async fn connect(url: &str) -> Result<Self, SharedCacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn try_acquire_lock(&self, key: &str, ttl_secs: u64) -> Result<bool, SharedCacheError> {
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("locked")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(acquired.is_some())
    }

    async fn release_lock(&self, key: &str) -> Result<(), SharedCacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn mark_processed_if_absent(&self, key: &str, ttl_secs: u64) -> Result<bool, SharedCacheError> {
        self.try_acquire_lock(key, ttl_secs).await
    }
}

/// In-memory fake for tests, mirroring `RedisSharedCache`'s semantics
/// without a live connection.
#[derive(Default)]
pub struct InMemorySharedCache {
    entries: std::sync::Mutex<std::collections::HashMap<String, std::time::Instant>>,
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn try_acquire_lock(&self, key: &str, ttl_secs: u64) -> Result<bool, SharedCacheError> {
        let mut entries = self.entries.lock().expect("shared cache lock poisoned");
        let now = std::time::Instant::now();
        entries.retain(|_, expires_at| *expires_at > now);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), now + std::time::Duration::from_secs(ttl_secs));
        Ok(true)
    }

    async fn release_lock(&self, key: &str) -> Result<(), SharedCacheError> {
        self.entries.lock().expect("shared cache lock poisoned").remove(key);
        Ok(())
    }

    async fn mark_processed_if_absent(&self, key: &str, ttl_secs: u64) -> Result<bool, SharedCacheError> {
        self.try_acquire_lock(key, ttl_secs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_lock_held() {
        let cache = InMemorySharedCache::new();
        assert!(cache.try_acquire_lock("coordinator", 60).await.unwrap());
        assert!(!cache.try_acquire_lock("coordinator", 60).await.unwrap());
        cache.release_lock("coordinator").await.unwrap();
        assert!(cache.try_acquire_lock("coordinator", 60).await.unwrap());
    }
}
