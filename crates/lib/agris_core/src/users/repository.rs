//! Cache-aside repository over a [`UserStore`].

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::cache::{Cache, keys};
use crate::error::{ServiceError, ServiceResult};
use crate::models::auth::Role;
use crate::models::user::{NewUser, User, UserQuery};

use super::store::UserStore;

/// Users by id (`user:{id}`) and by email (`user:email:{email}`), cached
/// for 30 minutes. Every mutation clears both keys after it commits.
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn UserStore>,
    cache: Cache,
}

impl UserRepository {
    pub fn new(store: Arc<dyn UserStore>, cache: Cache) -> Self {
        Self { store, cache }
    }

    /// Live user by id; soft-deleted users are `NotFound`.
    pub async fn find_by_id(&self, id: Uuid) -> ServiceResult<User> {
        let user: User = self
            .cache
            .read_through(&keys::user(id), keys::USER_TTL, || self.store.find_by_id(id))
            .await?;
        if user.is_deleted() {
            return Err(ServiceError::not_found());
        }
        Ok(user)
    }

    /// Any user by email, soft-deleted included.
    pub async fn find_by_email(&self, email: &str) -> ServiceResult<User> {
        self.cache
            .read_through(&keys::user_email(email), keys::USER_TTL, || {
                self.store.find_by_email(email)
            })
            .await
    }

    pub async fn create(&self, user: NewUser) -> ServiceResult<User> {
        let created = self.store.insert(user).await?;
        self.invalidate(&created).await;
        Ok(created)
    }

    pub async fn update_role(&self, id: Uuid, role: Role) -> ServiceResult<User> {
        let updated = self.store.update_role(id, role).await?;
        self.invalidate(&updated).await;
        Ok(updated)
    }

    pub async fn update_password(&self, id: Uuid, password_hash: &str) -> ServiceResult<User> {
        let updated = self.store.update_password(id, password_hash).await?;
        self.invalidate(&updated).await;
        Ok(updated)
    }

    pub async fn soft_delete(&self, id: Uuid) -> ServiceResult<User> {
        let deleted = self.store.soft_delete(id).await?;
        self.invalidate(&deleted).await;
        Ok(deleted)
    }

    /// Uncached: admin listings are rare and filter-heavy.
    pub async fn list(&self, query: &UserQuery) -> ServiceResult<(i64, Vec<User>)> {
        self.store.list(query).await
    }

    async fn invalidate(&self, user: &User) {
        debug!(user_id = %user.id, "invalidating cached user");
        self.cache
            .delete(&[keys::user(user.id), keys::user_email(&user.email)])
            .await;
    }
}
