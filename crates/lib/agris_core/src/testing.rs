//! In-memory stores and cache backends for tests.
//!
//! Enabled for this crate's own tests and, through the `test-utils`
//! feature, for dependent crates. Stores count calls per method so tests
//! can assert that a cached read never reached them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::cache::{CacheBackend, CacheError, CacheOp};
use crate::catalog::store::{ProductStore, RatingStore, UserRatingPage};
use crate::error::{ServiceError, ServiceResult};
use crate::models::auth::Role;
use crate::models::catalog::{
    Category, MyRatingsQuery, NewRating, Product, ProductQuery, ProductRef, ProductSort,
    ProductSummary, Rating, RatingChange, RatingQuery, RatingSort, RelationKind, RelationQuery,
    SortOrder, UserRating,
};
use crate::models::page::offset;
use crate::models::user::{NewUser, User, UserQuery};
use crate::search::normalize_search_text;
use crate::users::store::UserStore;

/// Per-method call counter.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<HashMap<&'static str, u32>>,
}

impl CallLog {
    fn hit(&self, method: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(method).or_default() += 1;
        }
    }

    pub fn get(&self, method: &str) -> u32 {
        self.calls
            .lock()
            .map(|c| c.get(method).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.calls.lock().map(|c| c.values().sum()).unwrap_or(0)
    }

    pub fn reset(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

fn paginate<T: Clone>(items: &[T], page: i64, limit: i64) -> Vec<T> {
    let start = usize::try_from(offset(page, limit)).unwrap_or(usize::MAX);
    items.iter().skip(start).take(limit.max(0) as usize).cloned().collect()
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A `NewUser` with a placeholder password hash.
pub fn new_user(email: &str) -> NewUser {
    NewUser {
        name: "Test User".into(),
        email: email.into(),
        password_hash: "$2b$10$placeholderplaceholderplaceholderplaceholderpl".into(),
        role: Role::User,
    }
}

/// A `NewUser` whose hash verifies against `password`.
pub fn new_user_with_password(email: &str, password: &str, role: Role) -> NewUser {
    NewUser {
        name: "Test User".into(),
        email: email.into(),
        password_hash: hash_password(password).unwrap_or_default(),
        role,
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
    pub calls: CallLog,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self, method: &str) -> u32 {
        self.calls.get(method)
    }

    fn lock(&self) -> ServiceResult<std::sync::MutexGuard<'_, HashMap<Uuid, User>>> {
        self.users.lock().map_err(|_| ServiceError::internal())
    }

    fn mutate(&self, id: Uuid, f: impl FnOnce(&mut User)) -> ServiceResult<User> {
        let mut users = self.lock()?;
        let user = users
            .get_mut(&id)
            .filter(|u| !u.is_deleted())
            .ok_or_else(ServiceError::not_found)?;
        f(user);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> ServiceResult<User> {
        self.calls.hit("find_by_id");
        self.lock()?
            .get(&id)
            .filter(|u| !u.is_deleted())
            .cloned()
            .ok_or_else(ServiceError::not_found)
    }

    async fn find_by_email(&self, email: &str) -> ServiceResult<User> {
        self.calls.hit("find_by_email");
        self.lock()?
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(ServiceError::not_found)
    }

    async fn insert(&self, user: NewUser) -> ServiceResult<User> {
        self.calls.hit("insert");
        let mut users = self.lock()?;
        if users.values().any(|u| u.email == user.email) {
            return Err(ServiceError::Conflict("email already exists".into()));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_role(&self, id: Uuid, role: Role) -> ServiceResult<User> {
        self.calls.hit("update_role");
        self.mutate(id, |u| u.role = role)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> ServiceResult<User> {
        self.calls.hit("update_password");
        self.mutate(id, |u| u.password_hash = password_hash.to_string())
    }

    async fn soft_delete(&self, id: Uuid) -> ServiceResult<User> {
        self.calls.hit("soft_delete");
        self.mutate(id, |u| u.deleted_at = Some(Utc::now()))
    }

    async fn list(&self, query: &UserQuery) -> ServiceResult<(i64, Vec<User>)> {
        self.calls.hit("list");
        let users = self.lock()?;
        let mut matching: Vec<User> = users
            .values()
            .filter(|u| !u.is_deleted())
            .filter(|u| {
                query.search.as_deref().is_none_or(|s| {
                    u.email.to_lowercase().contains(&s.to_lowercase())
                })
            })
            .filter(|u| query.role.is_none_or(|r| u.role == r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((matching.len() as i64, paginate(&matching, query.page, query.limit)))
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CatalogData {
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    relations: Vec<(Uuid, Uuid, RelationKind)>,
    /// Ratings with their soft-delete flag.
    ratings: Vec<(Rating, bool)>,
}

impl CatalogData {
    fn live_ratings(&self) -> impl Iterator<Item = &Rating> {
        self.ratings.iter().filter(|(_, deleted)| !deleted).map(|(r, _)| r)
    }

    fn refresh_aggregates(&mut self, product_id: Uuid) -> ServiceResult<ProductSummary> {
        let stars: Vec<i32> = self
            .live_ratings()
            .filter(|r| r.product_id == product_id)
            .map(|r| r.stars)
            .collect();
        let product = self
            .products
            .get_mut(&product_id)
            .ok_or_else(ServiceError::not_found)?;
        product.total_ratings = stars.len() as i32;
        product.average_rating = if stars.is_empty() {
            0.0
        } else {
            let avg = stars.iter().sum::<i32>() as f64 / stars.len() as f64;
            (avg * 100.0).round() / 100.0
        };
        product.updated_at = Utc::now();
        Ok(ProductSummary::from(&*product))
    }
}

/// In-memory [`ProductStore`] + [`RatingStore`].
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    data: Mutex<CatalogData>,
    pub calls: CallLog,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self, method: &str) -> u32 {
        self.calls.get(method)
    }

    fn lock(&self) -> ServiceResult<std::sync::MutexGuard<'_, CatalogData>> {
        self.data.lock().map_err(|_| ServiceError::internal())
    }

    /// Seed a category.
    pub fn add_category(&self, name: &str) -> Category {
        let now = Utc::now();
        let category = Category {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            created_at: now,
            updated_at: now,
        };
        if let Ok(mut data) = self.data.lock() {
            data.categories.insert(category.id, category.clone());
        }
        category
    }

    /// Seed a product in `category`.
    pub fn add_product(&self, name: &str, price: f64, category: &Category) -> Product {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: name.into(),
            search_name: normalize_search_text(name),
            description: Some(format!("{name} description")),
            price,
            category_id: category.id,
            average_rating: 0.0,
            total_ratings: 0,
            created_at: now,
            updated_at: now,
            category: Some(category.clone()),
        };
        if let Ok(mut data) = self.data.lock() {
            data.products.insert(product.id, product.clone());
        }
        product
    }

    /// Seed a `kind` edge from `from` to `to`.
    pub fn link(&self, from: Uuid, to: Uuid, kind: RelationKind) {
        if let Ok(mut data) = self.data.lock() {
            data.relations.push((from, to, kind));
        }
    }

    /// Current stored copy of a product, bypassing call counting.
    pub fn product(&self, id: Uuid) -> Option<Product> {
        self.data.lock().ok()?.products.get(&id).cloned()
    }
}

fn sort_products(products: &mut [Product], sort: ProductSort, order: SortOrder) {
    products.sort_by(|a, b| {
        let ord = match sort {
            ProductSort::AverageRating => a.average_rating.total_cmp(&b.average_rating),
            ProductSort::Name => a.name.cmp(&b.name),
            ProductSort::Price => a.price.total_cmp(&b.price),
            ProductSort::CreatedAt => a.created_at.cmp(&b.created_at),
        };
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}

fn sort_ratings<T>(items: &mut [T], sort: RatingSort, key: impl Fn(&T) -> (i32, chrono::DateTime<Utc>)) {
    items.sort_by(|a, b| {
        let (sa, ca) = key(a);
        let (sb, cb) = key(b);
        match sort {
            RatingSort::Newest => cb.cmp(&ca),
            RatingSort::Oldest => ca.cmp(&cb),
            RatingSort::Highest => sb.cmp(&sa).then(cb.cmp(&ca)),
            RatingSort::Lowest => sa.cmp(&sb).then(cb.cmp(&ca)),
        }
    });
}

#[async_trait]
impl ProductStore for InMemoryCatalogStore {
    async fn list(&self, query: &ProductQuery) -> ServiceResult<(i64, Vec<Product>)> {
        self.calls.hit("list_products");
        let data = self.lock()?;
        let needle = query.search.as_deref().map(normalize_search_text);
        let mut matching: Vec<Product> = data
            .products
            .values()
            .filter(|p| needle.as_deref().is_none_or(|n| p.search_name.contains(n)))
            .filter(|p| query.category_ids.is_empty() || query.category_ids.contains(&p.category_id))
            .filter(|p| query.min_price.is_none_or(|m| p.price >= m))
            .filter(|p| query.max_price.is_none_or(|m| p.price <= m))
            .filter(|p| query.min_rate.is_none_or(|m| p.average_rating >= m))
            .filter(|p| query.max_rate.is_none_or(|m| p.average_rating <= m))
            .cloned()
            .collect();
        sort_products(&mut matching, query.sort, query.order);
        Ok((matching.len() as i64, paginate(&matching, query.page, query.limit)))
    }

    async fn get(&self, id: Uuid) -> ServiceResult<Product> {
        self.calls.hit("get_product");
        self.lock()?
            .products
            .get(&id)
            .cloned()
            .ok_or_else(ServiceError::not_found)
    }

    async fn relations(
        &self,
        id: Uuid,
        kind: RelationKind,
        query: RelationQuery,
    ) -> ServiceResult<(i64, Vec<Product>)> {
        self.calls.hit("relations");
        let data = self.lock()?;
        let mut linked: Vec<Product> = data
            .relations
            .iter()
            .filter(|(from, _, k)| *from == id && *k == kind)
            .filter_map(|(_, to, _)| data.products.get(to).cloned())
            .collect();
        linked.sort_by(|a, b| {
            b.average_rating
                .total_cmp(&a.average_rating)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok((linked.len() as i64, paginate(&linked, query.page, query.limit)))
    }
}

#[async_trait]
impl RatingStore for InMemoryCatalogStore {
    async fn find(&self, id: Uuid) -> ServiceResult<Rating> {
        self.calls.hit("find_rating");
        self.lock()?
            .live_ratings()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(ServiceError::not_found)
    }

    async fn find_for_user_and_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> ServiceResult<Option<Rating>> {
        self.calls.hit("find_for_user_and_product");
        Ok(self
            .lock()?
            .live_ratings()
            .find(|r| r.user_id == user_id && r.product_id == product_id)
            .cloned())
    }

    async fn create(&self, rating: NewRating) -> ServiceResult<RatingChange> {
        self.calls.hit("create_rating");
        let mut data = self.lock()?;
        if !data.products.contains_key(&rating.product_id) {
            return Err(ServiceError::not_found());
        }
        if data
            .live_ratings()
            .any(|r| r.user_id == rating.user_id && r.product_id == rating.product_id)
        {
            return Err(ServiceError::Conflict(
                "you have already rated this product".into(),
            ));
        }
        let now = Utc::now();
        let created = Rating {
            id: Uuid::new_v4(),
            product_id: rating.product_id,
            user_id: rating.user_id,
            stars: rating.stars,
            comment: rating.comment,
            created_at: now,
            updated_at: now,
        };
        data.ratings.push((created.clone(), false));
        let product = data.refresh_aggregates(created.product_id)?;
        Ok(RatingChange {
            rating: created,
            product,
        })
    }

    async fn update(
        &self,
        id: Uuid,
        stars: i32,
        comment: Option<String>,
    ) -> ServiceResult<RatingChange> {
        self.calls.hit("update_rating");
        let mut data = self.lock()?;
        let (rating, _) = data
            .ratings
            .iter_mut()
            .find(|(r, deleted)| r.id == id && !deleted)
            .ok_or_else(ServiceError::not_found)?;
        rating.stars = stars;
        rating.comment = comment;
        rating.updated_at = Utc::now();
        let updated = rating.clone();
        let product = data.refresh_aggregates(updated.product_id)?;
        Ok(RatingChange {
            rating: updated,
            product,
        })
    }

    async fn delete(&self, id: Uuid) -> ServiceResult<RatingChange> {
        self.calls.hit("delete_rating");
        let mut data = self.lock()?;
        let (rating, deleted) = data
            .ratings
            .iter_mut()
            .find(|(r, deleted)| r.id == id && !deleted)
            .ok_or_else(ServiceError::not_found)?;
        *deleted = true;
        let removed = rating.clone();
        let product = data.refresh_aggregates(removed.product_id)?;
        Ok(RatingChange {
            rating: removed,
            product,
        })
    }

    async fn list_for_product(&self, query: &RatingQuery) -> ServiceResult<(i64, Vec<Rating>)> {
        self.calls.hit("list_for_product");
        let data = self.lock()?;
        let mut matching: Vec<Rating> = data
            .live_ratings()
            .filter(|r| r.product_id == query.product_id)
            .filter(|r| query.stars.is_none_or(|s| r.stars == s))
            .cloned()
            .collect();
        sort_ratings(&mut matching, query.sort, |r| (r.stars, r.created_at));
        Ok((matching.len() as i64, paginate(&matching, query.page, query.limit)))
    }

    async fn star_counts(&self, product_id: Uuid) -> ServiceResult<[i64; 5]> {
        self.calls.hit("star_counts");
        let data = self.lock()?;
        if !data.products.contains_key(&product_id) {
            return Err(ServiceError::not_found());
        }
        let mut counts = [0i64; 5];
        for r in data.live_ratings().filter(|r| r.product_id == product_id) {
            if (1..=5).contains(&r.stars) {
                counts[(r.stars - 1) as usize] += 1;
            }
        }
        Ok(counts)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        query: &MyRatingsQuery,
    ) -> ServiceResult<UserRatingPage> {
        self.calls.hit("list_for_user");
        let data = self.lock()?;
        let mut mine: Vec<UserRating> = data
            .live_ratings()
            .filter(|r| r.user_id == user_id)
            .filter_map(|r| {
                let product = data.products.get(&r.product_id)?;
                Some(UserRating {
                    id: r.id,
                    product: ProductRef {
                        id: product.id,
                        name: product.name.clone(),
                    },
                    stars: r.stars,
                    comment: r.comment.clone(),
                    created_at: r.created_at,
                    updated_at: r.updated_at,
                })
            })
            .collect();
        sort_ratings(&mut mine, query.sort, |r| (r.stars, r.created_at));
        Ok(UserRatingPage {
            total: mine.len() as i64,
            star_sum: mine.iter().map(|r| r.stars as i64).sum(),
            data: paginate(&mine, query.page, query.limit),
        })
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Cache backend where every operation fails, as if Redis were down.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingCache;

fn down() -> CacheError {
    CacheError::Backend("cache unavailable".into())
}

#[async_trait]
impl CacheBackend for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(down())
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(down())
    }

    async fn delete(&self, _keys: &[String]) -> Result<u64, CacheError> {
        Err(down())
    }

    async fn delete_pattern(&self, _pattern: &str) -> Result<u64, CacheError> {
        Err(down())
    }

    async fn execute_atomic(&self, _ops: Vec<CacheOp>) -> Result<(), CacheError> {
        Err(down())
    }

    async fn sorted_set_score(&self, _key: &str, _member: &str) -> Result<Option<f64>, CacheError> {
        Err(down())
    }

    async fn sorted_set_remove(&self, _key: &str, _member: &str) -> Result<bool, CacheError> {
        Err(down())
    }
}
