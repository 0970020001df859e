//! Cache gateway.
//!
//! [`CacheBackend`] is the raw key/value store (Redis in production,
//! [`MemoryCache`] in tests). [`Cache`] wraps it for the repositories:
//! reads that fail are misses, writes and deletes that fail are no-ops.
//! The relational store stays the source of truth, so nothing in the
//! cache-aside path ever fails a request because the cache is down.
//!
//! The refresh-token record is the exception: its operations return
//! `Result` because the auth flow has to branch on them.

pub mod keys;
pub mod memory;
pub mod redis;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ServiceResult;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Cache backend failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("{0}")]
    Backend(String),
}

/// One command of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOp {
    SortedSetAdd {
        key: String,
        member: String,
        score: f64,
    },
    /// Drop members whose score is at or below `max_score`.
    SortedSetRemoveBelow { key: String, max_score: f64 },
    Expire { key: String, ttl: Duration },
}

/// Raw key/value store with TTLs, glob deletion and atomic batches.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Returns how many keys existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// Delete every key matching a glob (`*`, `?`). Returns how many were removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;

    /// Apply all ops in one round trip; either all apply or none do.
    async fn execute_atomic(&self, ops: Vec<CacheOp>) -> Result<(), CacheError>;

    async fn sorted_set_score(&self, key: &str, member: &str) -> Result<Option<f64>, CacheError>;

    /// Returns whether the member was present.
    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, CacheError>;
}

/// Best-effort cache used by the repositories.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}

impl Cache {
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// In-process cache, for tests and `--cache memory`.
    pub fn in_memory() -> Self {
        Self::new(MemoryCache::new())
    }

    /// Read and decode a JSON entry. Backend or decode failure is a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "undecodable cache entry, treating as miss");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "cache encode failed, skipping write");
                return;
            }
        };
        if let Err(e) = self.backend.set(key, raw, ttl).await {
            warn!(key, error = %e, "cache write failed");
        }
    }

    pub async fn delete(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.backend.delete(keys).await {
            warn!(keys = ?keys, error = %e, "cache delete failed");
        }
    }

    pub async fn delete_pattern(&self, pattern: &str) {
        match self.backend.delete_pattern(pattern).await {
            Ok(removed) => debug!(pattern, removed, "cache pattern deleted"),
            Err(e) => warn!(pattern, error = %e, "cache pattern delete failed"),
        }
    }

    /// Cache-aside read.
    ///
    /// A hit returns without calling `load`. On a miss, `load` runs and a
    /// successful result is written back with `ttl`. Errors from `load`
    /// (including `NotFound`) are returned as-is and never cached.
    pub async fn read_through<T, F, Fut>(&self, key: &str, ttl: Duration, load: F) -> ServiceResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        if let Some(hit) = self.get_json(key).await {
            return Ok(hit);
        }
        let value = load().await?;
        self.set_json(key, &value, ttl).await;
        Ok(value)
    }

    pub async fn execute_atomic(&self, ops: Vec<CacheOp>) -> Result<(), CacheError> {
        self.backend.execute_atomic(ops).await
    }

    pub async fn sorted_set_score(&self, key: &str, member: &str) -> Result<Option<f64>, CacheError> {
        self.backend.sorted_set_score(key, member).await
    }

    pub async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.backend.sorted_set_remove(key, member).await
    }

    /// Delete keys, reporting failure instead of swallowing it.
    pub async fn delete_checked(&self, keys: &[String]) -> Result<u64, CacheError> {
        self.backend.delete(keys).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde::Deserialize;

    use super::*;
    use crate::error::ServiceError;
    use crate::testing::FailingCache;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u32,
        name: String,
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn read_through_loads_once_then_hits() {
        let cache = Cache::in_memory();
        let counter = AtomicU32::new(0);
        let loads = &counter;

        let first: Item = cache
            .read_through("item:1", TTL, || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(Item { id: 1, name: "a".into() })
            })
            .await
            .unwrap();
        let second: Item = cache
            .read_through("item:1", TTL, || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(Item { id: 9, name: "stale?".into() })
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_is_not_cached() {
        let cache = Cache::in_memory();
        let counter = AtomicU32::new(0);
        let loads = &counter;
        for _ in 0..2 {
            let res: ServiceResult<Item> = cache
                .read_through("item:missing", TTL, || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Err(ServiceError::not_found())
                })
                .await;
            assert_eq!(res, Err(ServiceError::not_found()));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unavailable_backend_degrades_to_loader() {
        let cache = Cache::new(FailingCache);
        let item: Item = cache
            .read_through("item:1", TTL, || async { Ok(Item { id: 1, name: "a".into() }) })
            .await
            .unwrap();
        assert_eq!(item.id, 1);

        // Swallowed, not panicking or propagating.
        cache.delete(&["item:1".to_string()]).await;
        cache.delete_pattern("item:*").await;
        assert!(cache.execute_atomic(vec![]).await.is_err());
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let cache = Cache::in_memory();
        cache.set_json("item:1", &"just a string", TTL).await;
        let got: Option<Item> = cache.get_json("item:1").await;
        assert!(got.is_none());
    }
}
