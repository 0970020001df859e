//! Cache-aside repositories for the catalog.
//!
//! Reads go through [`Cache::read_through`] with a one-hour TTL. Rating
//! writes commit first, then clear every entry that could show the old
//! state: the product, its statistics, every product listing, every
//! rating page of the product and every "my ratings" page of the author.
//! A reader racing the invalidation can still repopulate a stale entry;
//! that window is bounded by the TTL.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::cache::{Cache, keys};
use crate::error::ServiceResult;
use crate::models::catalog::{
    MyRatingSummary, MyRatings, MyRatingsQuery, NewRating, Product, ProductQuery, Rating,
    RatingChange, RatingQuery, RatingStatistics, RelationKind, RelationQuery,
};
use crate::models::page::Page;

use super::statistics::{summarize_ratings, truncate2};
use super::store::{ProductStore, RatingStore};

#[derive(Clone)]
pub struct ProductRepository {
    store: Arc<dyn ProductStore>,
    cache: Cache,
}

impl ProductRepository {
    pub fn new(store: Arc<dyn ProductStore>, cache: Cache) -> Self {
        Self { store, cache }
    }

    pub async fn list(&self, query: &ProductQuery) -> ServiceResult<Page<Product, ProductQuery>> {
        let store = &self.store;
        self.cache
            .read_through(&keys::product_list(query), keys::CATALOG_TTL, || async move {
                let (total, data) = store.list(query).await?;
                Ok(Page {
                    total,
                    data,
                    filter: query.clone(),
                })
            })
            .await
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<Product> {
        self.cache
            .read_through(&keys::product(id), keys::CATALOG_TTL, || self.store.get(id))
            .await
    }

    /// Similar or related products. These embed other products'
    /// aggregates and are left to expire rather than invalidated.
    pub async fn relations(
        &self,
        id: Uuid,
        kind: RelationKind,
        query: RelationQuery,
    ) -> ServiceResult<Page<Product, RelationQuery>> {
        let store = &self.store;
        self.cache
            .read_through(&keys::relations(kind, id, query), keys::CATALOG_TTL, || async move {
                let (total, data) = store.relations(id, kind, query).await?;
                Ok(Page {
                    total,
                    data,
                    filter: query,
                })
            })
            .await
    }
}

#[derive(Clone)]
pub struct RatingRepository {
    store: Arc<dyn RatingStore>,
    cache: Cache,
}

impl RatingRepository {
    pub fn new(store: Arc<dyn RatingStore>, cache: Cache) -> Self {
        Self { store, cache }
    }

    /// Uncached; write paths need the committed row.
    pub async fn find(&self, id: Uuid) -> ServiceResult<Rating> {
        self.store.find(id).await
    }

    /// Uncached; write paths need the committed row.
    pub async fn find_for_user_and_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> ServiceResult<Option<Rating>> {
        self.store.find_for_user_and_product(user_id, product_id).await
    }

    pub async fn create(&self, rating: NewRating) -> ServiceResult<RatingChange> {
        let change = self.store.create(rating).await?;
        self.invalidate(&change.rating).await;
        Ok(change)
    }

    pub async fn update(
        &self,
        id: Uuid,
        stars: i32,
        comment: Option<String>,
    ) -> ServiceResult<RatingChange> {
        let change = self.store.update(id, stars, comment).await?;
        self.invalidate(&change.rating).await;
        Ok(change)
    }

    pub async fn delete(&self, id: Uuid) -> ServiceResult<RatingChange> {
        let change = self.store.delete(id).await?;
        self.invalidate(&change.rating).await;
        Ok(change)
    }

    pub async fn list_for_product(
        &self,
        query: &RatingQuery,
    ) -> ServiceResult<Page<Rating, RatingQuery>> {
        let store = &self.store;
        self.cache
            .read_through(&keys::ratings_of_product(query), keys::CATALOG_TTL, || async move {
                let (total, data) = store.list_for_product(query).await?;
                Ok(Page {
                    total,
                    data,
                    filter: query.clone(),
                })
            })
            .await
    }

    pub async fn statistics(&self, product_id: Uuid) -> ServiceResult<RatingStatistics> {
        let store = &self.store;
        self.cache
            .read_through(&keys::rating_statistics(product_id), keys::CATALOG_TTL, || async move {
                let counts = store.star_counts(product_id).await?;
                Ok(summarize_ratings(product_id, counts))
            })
            .await
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        query: &MyRatingsQuery,
    ) -> ServiceResult<MyRatings> {
        let store = &self.store;
        self.cache
            .read_through(&keys::ratings_of_user(user_id, query), keys::CATALOG_TTL, || async move {
                let page = store.list_for_user(user_id, query).await?;
                let avg_stars_given = if page.total == 0 {
                    0.0
                } else {
                    truncate2(page.star_sum as f64 / page.total as f64)
                };
                Ok(MyRatings {
                    total: page.total,
                    data: page.data,
                    pagination: query.clone(),
                    summary: MyRatingSummary {
                        total_ratings: page.total,
                        avg_stars_given,
                    },
                })
            })
            .await
    }

    async fn invalidate(&self, rating: &Rating) {
        debug!(
            rating_id = %rating.id,
            product_id = %rating.product_id,
            user_id = %rating.user_id,
            "invalidating rating views"
        );
        self.cache
            .delete(&[
                keys::product(rating.product_id),
                keys::rating_statistics(rating.product_id),
            ])
            .await;
        self.cache.delete_pattern(&keys::product_list_pattern()).await;
        self.cache
            .delete_pattern(&keys::ratings_of_product_pattern(rating.product_id))
            .await;
        self.cache
            .delete_pattern(&keys::ratings_of_user_pattern(rating.user_id))
            .await;
    }
}
