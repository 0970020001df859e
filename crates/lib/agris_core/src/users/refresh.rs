//! Server-side refresh-token record.
//!
//! One sorted set per user at `refresh_tokens:{user_id}`. Members are
//! SHA-256 digests of the token string, scored by the token's expiry
//! (unix seconds). Every save prunes expired members and pushes the
//! set's own expiry out to 30 days, so an idle record disappears on its own.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::cache::{Cache, CacheError, CacheOp, keys};

#[derive(Debug, Clone)]
pub struct RefreshTokenStore {
    cache: Cache,
}

/// SHA-256 hash a refresh token for storage.
fn digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl RefreshTokenStore {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// Record a newly issued refresh token, in a single atomic round trip.
    pub async fn save(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let key = keys::refresh_tokens(user_id);
        let now = Utc::now().timestamp() as f64;
        self.cache
            .execute_atomic(vec![
                CacheOp::SortedSetAdd {
                    key: key.clone(),
                    member: digest(token),
                    score: expires_at.timestamp() as f64,
                },
                CacheOp::SortedSetRemoveBelow {
                    key: key.clone(),
                    max_score: now,
                },
                CacheOp::Expire {
                    key,
                    ttl: keys::REFRESH_RECORD_TTL,
                },
            ])
            .await
    }

    /// Remove `token` from the record if it is present and unexpired.
    ///
    /// Returns `true` exactly once per saved token, so a replayed token
    /// is rejected even while its signature is still valid.
    pub async fn consume(&self, user_id: Uuid, token: &str) -> Result<bool, CacheError> {
        let key = keys::refresh_tokens(user_id);
        let member = digest(token);
        let Some(expires) = self.cache.sorted_set_score(&key, &member).await? else {
            debug!(%user_id, "refresh token not in record");
            return Ok(false);
        };
        let removed = self.cache.sorted_set_remove(&key, &member).await?;
        Ok(removed && expires > Utc::now().timestamp() as f64)
    }

    /// Drop one token (logout). Missing tokens are not an error.
    pub async fn revoke(&self, user_id: Uuid, token: &str) -> Result<bool, CacheError> {
        self.cache
            .sorted_set_remove(&keys::refresh_tokens(user_id), &digest(token))
            .await
    }

    /// Drop every refresh token of a user.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<(), CacheError> {
        self.cache
            .delete_checked(&[keys::refresh_tokens(user_id)])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::cache::{CacheBackend, MemoryCache};

    fn store() -> (RefreshTokenStore, MemoryCache) {
        let backend = MemoryCache::new();
        (RefreshTokenStore::new(Cache::new(backend.clone())), backend)
    }

    #[tokio::test]
    async fn saved_token_is_consumed_once() {
        let (store, _) = store();
        let uid = Uuid::new_v4();
        store.save(uid, "tok", Utc::now() + Duration::days(1)).await.unwrap();

        assert!(store.consume(uid, "tok").await.unwrap());
        assert!(!store.consume(uid, "tok").await.unwrap());
    }

    #[tokio::test]
    async fn several_devices_hold_independent_tokens() {
        let (store, _) = store();
        let uid = Uuid::new_v4();
        let exp = Utc::now() + Duration::days(1);
        store.save(uid, "phone", exp).await.unwrap();
        store.save(uid, "laptop", exp).await.unwrap();

        assert!(store.revoke(uid, "phone").await.unwrap());
        assert!(store.consume(uid, "laptop").await.unwrap());
    }

    #[tokio::test]
    async fn expired_entry_is_not_accepted() {
        let (store, _) = store();
        let uid = Uuid::new_v4();
        store.save(uid, "old", Utc::now() - Duration::seconds(5)).await.unwrap();
        assert!(!store.consume(uid, "old").await.unwrap());
    }

    #[tokio::test]
    async fn record_stores_digests_and_rolls_its_ttl() {
        let (store, backend) = store();
        let uid = Uuid::new_v4();
        store.save(uid, "secret-token", Utc::now() + Duration::days(1)).await.unwrap();

        let key = keys::refresh_tokens(uid);
        let ttl = backend.ttl(&key).unwrap();
        assert!(ttl > keys::REFRESH_RECORD_TTL - std::time::Duration::from_secs(5));
        assert_eq!(
            backend.sorted_set_score(&key, "secret-token").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn revoke_all_empties_the_record() {
        let (store, backend) = store();
        let uid = Uuid::new_v4();
        store.save(uid, "a", Utc::now() + Duration::days(1)).await.unwrap();
        store.revoke_all(uid).await.unwrap();
        assert!(!backend.contains(&keys::refresh_tokens(uid)));
        assert!(!store.consume(uid, "a").await.unwrap());
    }
}
