//! Redis cache backend.

use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use tracing::debug;

use super::{CacheBackend, CacheError, CacheOp};

/// Keys requested per SCAN round trip.
const SCAN_BATCH: usize = 100;

/// [`CacheBackend`] over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Round-trip check used at startup.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = ::redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(removed)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let mut cursor = 0u64;
        let mut removed = 0u64;

        loop {
            let (next, batch): (u64, Vec<String>) = ::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !batch.is_empty() {
                let n: u64 = ::redis::cmd("DEL").arg(&batch).query_async(&mut conn).await?;
                removed += n;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern, removed, "redis pattern delete");
        Ok(removed)
    }

    async fn execute_atomic(&self, ops: Vec<CacheOp>) -> Result<(), CacheError> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut pipe = ::redis::pipe();
        pipe.atomic();
        for op in ops {
            match op {
                CacheOp::SortedSetAdd { key, member, score } => {
                    pipe.zadd(key, member, score).ignore();
                }
                CacheOp::SortedSetRemoveBelow { key, max_score } => {
                    pipe.zrembyscore(key, "-inf", max_score).ignore();
                }
                CacheOp::Expire { key, ttl } => {
                    pipe.expire(key, ttl_secs(ttl) as i64).ignore();
                }
            }
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn sorted_set_score(&self, key: &str, member: &str) -> Result<Option<f64>, CacheError> {
        let mut conn = self.conn.clone();
        Ok(conn.zscore(key, member).await?)
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.zrem(key, member).await?;
        Ok(removed > 0)
    }
}
