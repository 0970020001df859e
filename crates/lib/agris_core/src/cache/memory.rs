//! In-process cache backend.
//!
//! Implements the same contract as Redis (TTLs, glob deletion, sorted sets,
//! atomic batches) so repositories can run without a server.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use tokio::time::Instant;

use super::{CacheBackend, CacheError, CacheOp};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    SortedSet(HashMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Dashmap-backed [`CacheBackend`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
    /// Batches take the write side so they apply as one step.
    batch: Arc<RwLock<()>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live keys, sorted. For assertions in tests.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_live(now))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries.get(key).is_some_and(|e| e.is_live(now))
    }

    /// Remaining lifetime of a key, if it has one.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.entries.get(key)?.clone();
        if entry.is_live(now) {
            Some(entry)
        } else {
            self.entries.remove(key);
            None
        }
    }

    fn apply(&self, op: CacheOp) {
        let now = Instant::now();
        match op {
            CacheOp::SortedSetAdd { key, member, score } => {
                let mut entry = self.entries.entry(key).or_insert_with(|| Entry {
                    value: Value::SortedSet(HashMap::new()),
                    expires_at: None,
                });
                if !entry.is_live(now) || !matches!(entry.value, Value::SortedSet(_)) {
                    *entry = Entry {
                        value: Value::SortedSet(HashMap::new()),
                        expires_at: None,
                    };
                }
                if let Value::SortedSet(set) = &mut entry.value {
                    set.insert(member, score);
                }
            }
            CacheOp::SortedSetRemoveBelow { key, max_score } => {
                if let Some(mut entry) = self.entries.get_mut(&key)
                    && let Value::SortedSet(set) = &mut entry.value
                {
                    set.retain(|_, score| *score > max_score);
                }
            }
            CacheOp::Expire { key, ttl } => {
                if let Some(mut entry) = self.entries.get_mut(&key) {
                    entry.expires_at = Some(now + ttl);
                }
            }
        }
    }
}

/// Translate a Redis glob (`*`, `?`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re)
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let _guard = self.batch.read().map_err(|_| CacheError::Backend("poisoned".into()))?;
        match self.live(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s)),
            Some(_) => Err(CacheError::Backend(format!("wrong type for key {key}"))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let _guard = self.batch.read().map_err(|_| CacheError::Backend("poisoned".into()))?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let _guard = self.batch.read().map_err(|_| CacheError::Backend("poisoned".into()))?;
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|k| self.entries.remove(k))
            .filter(|(_, e)| e.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let re = glob_to_regex(pattern)?;
        let _guard = self.batch.read().map_err(|_| CacheError::Backend("poisoned".into()))?;
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|e| re.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect();
        let now = Instant::now();
        let removed = matching
            .iter()
            .filter_map(|k| self.entries.remove(k))
            .filter(|(_, e)| e.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn execute_atomic(&self, ops: Vec<CacheOp>) -> Result<(), CacheError> {
        let _guard = self.batch.write().map_err(|_| CacheError::Backend("poisoned".into()))?;
        for op in ops {
            self.apply(op);
        }
        Ok(())
    }

    async fn sorted_set_score(&self, key: &str, member: &str) -> Result<Option<f64>, CacheError> {
        let _guard = self.batch.read().map_err(|_| CacheError::Backend("poisoned".into()))?;
        match self.live(key) {
            Some(Entry {
                value: Value::SortedSet(set),
                ..
            }) => Ok(set.get(member).copied()),
            Some(_) => Err(CacheError::Backend(format!("wrong type for key {key}"))),
            None => Ok(None),
        }
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let _guard = self.batch.read().map_err(|_| CacheError::Backend("poisoned".into()))?;
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(false);
        };
        match &mut entry.value {
            Value::SortedSet(set) => Ok(set.remove(member).is_some()),
            Value::Str(_) => Err(CacheError::Backend(format!("wrong type for key {key}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn set_get_delete() {
        let cache = MemoryCache::new();
        cache.set("a", "1".into(), TTL).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(cache.delete(&["a".into(), "b".into()]).await.unwrap(), 1);
        assert_eq!(cache.get("a").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache.set("a", "1".into(), Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.contains("a"));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn pattern_delete_only_touches_matches() {
        let cache = MemoryCache::new();
        for key in ["rateofproduct:p1:page:1", "rateofproduct:p1:page:2", "rateofproduct:p2:page:1"] {
            cache.set(key, "x".into(), TTL).await.unwrap();
        }
        let removed = cache.delete_pattern("rateofproduct:p1:*").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.keys(), vec!["rateofproduct:p2:page:1".to_string()]);
    }

    #[tokio::test]
    async fn pattern_delete_without_matches_is_a_noop() {
        let cache = MemoryCache::new();
        cache.set("product:1", "x".into(), TTL).await.unwrap();
        for _ in 0..3 {
            assert_eq!(cache.delete_pattern("productlist:*").await.unwrap(), 0);
        }
        assert!(cache.contains("product:1"));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        let re = glob_to_regex("user:email:a.b+c@x.com").unwrap();
        assert!(re.is_match("user:email:a.b+c@x.com"));
        assert!(!re.is_match("user:email:aXb+c@x.com"));
        let re = glob_to_regex("p?:*").unwrap();
        assert!(re.is_match("p1:anything"));
        assert!(!re.is_match("p12:anything"));
    }

    #[tokio::test(start_paused = true)]
    async fn atomic_batch_maintains_sorted_set() {
        let cache = MemoryCache::new();
        cache
            .execute_atomic(vec![
                CacheOp::SortedSetAdd {
                    key: "z".into(),
                    member: "old".into(),
                    score: 10.0,
                },
                CacheOp::SortedSetAdd {
                    key: "z".into(),
                    member: "new".into(),
                    score: 100.0,
                },
                CacheOp::SortedSetRemoveBelow {
                    key: "z".into(),
                    max_score: 50.0,
                },
                CacheOp::Expire {
                    key: "z".into(),
                    ttl: TTL,
                },
            ])
            .await
            .unwrap();

        assert_eq!(cache.sorted_set_score("z", "old").await.unwrap(), None);
        assert_eq!(cache.sorted_set_score("z", "new").await.unwrap(), Some(100.0));
        assert_eq!(cache.ttl("z"), Some(TTL));
        assert!(cache.sorted_set_remove("z", "new").await.unwrap());
        assert!(!cache.sorted_set_remove("z", "new").await.unwrap());
    }
}
