//! Catalog service bodies.

use agris_core::models::catalog::{ProductSummary, RatingChange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw `/products/list` query string. `category_ids` is comma separated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub category_ids: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rate: Option<f64>,
    pub max_rate: Option<f64>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RatingListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub stars: Option<i32>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MyRatingsParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
}

/// Body of rating create and update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateRequest {
    #[serde(default)]
    pub stars: i32,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rater {
    pub id: Uuid,
    pub name: String,
}

/// A written rating with its rater and the product's fresh aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingResponse {
    pub id: Uuid,
    pub stars: i32,
    pub comment: Option<String>,
    pub user: Rater,
    pub product: ProductSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RatingResponse {
    pub fn new(change: RatingChange, user: Rater) -> Self {
        Self {
            id: change.rating.id,
            stars: change.rating.stars,
            comment: change.rating.comment,
            user,
            product: change.product,
            created_at: change.rating.created_at,
            updated_at: change.rating.updated_at,
        }
    }
}
