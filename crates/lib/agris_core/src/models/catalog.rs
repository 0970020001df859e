//! Catalog domain models: products, categories, ratings and the
//! payloads cached for them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A live (not soft-deleted) product with its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub search_name: String,
    pub description: Option<String>,
    pub price: f64,
    pub category_id: Uuid,
    pub average_rating: f64,
    pub total_ratings: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category: Option<Category>,
}

/// Product fields embedded in rating responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub average_rating: f64,
    pub total_ratings: i32,
}

impl From<&Product> for ProductSummary {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            description: p.description.clone(),
            price: p.price,
            average_rating: p.average_rating,
            total_ratings: p.total_ratings,
        }
    }
}

/// A live rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub stars: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRating {
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub stars: i32,
    pub comment: Option<String>,
}

/// Result of a rating write: the rating plus its product's recomputed aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingChange {
    pub rating: Rating,
    pub product: ProductSummary,
}

// ---------------------------------------------------------------------------
// Query parameters (already normalized by the service layer)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Similar,
    Related,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::Similar => "similar",
            RelationKind::Related => "related",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    AverageRating,
    Name,
    Price,
    CreatedAt,
}

impl ProductSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "average_rating" => Some(Self::AverageRating),
            "name" => Some(Self::Name),
            "price" => Some(Self::Price),
            "created_at" => Some(Self::CreatedAt),
            _ => None,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::AverageRating => "average_rating",
            Self::Name => "name",
            Self::Price => "price",
            Self::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Some(Self::Asc),
            "DESC" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Product listing filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductQuery {
    pub page: i64,
    pub limit: i64,
    pub search: Option<String>,
    pub category_ids: Vec<Uuid>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rate: Option<f64>,
    pub max_rate: Option<f64>,
    pub sort: ProductSort,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationQuery {
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingSort {
    Newest,
    Oldest,
    Highest,
    Lowest,
}

impl RatingSort {
    /// Unknown or missing values sort newest first.
    pub fn parse_or_default(s: Option<&str>) -> Self {
        match s.map(str::to_ascii_lowercase).as_deref() {
            Some("oldest") => Self::Oldest,
            Some("highest") => Self::Highest,
            Some("lowest") => Self::Lowest,
            _ => Self::Newest,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::Highest => "highest",
            Self::Lowest => "lowest",
        }
    }

    pub fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "r.created_at DESC",
            Self::Oldest => "r.created_at ASC",
            Self::Highest => "r.stars DESC, r.created_at DESC",
            Self::Lowest => "r.stars ASC, r.created_at DESC",
        }
    }
}

impl fmt::Display for RatingSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ratings of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingQuery {
    pub product_id: Uuid,
    pub page: i64,
    pub limit: i64,
    /// `None` means every star value.
    pub stars: Option<i32>,
    pub sort: RatingSort,
}

/// Ratings written by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyRatingsQuery {
    pub page: i64,
    pub limit: i64,
    pub sort: RatingSort,
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub avg_rating: f64,
    pub total_ratings: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarDetail {
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionPoint {
    pub stars: i32,
    pub count: i64,
    pub percentage: f64,
}

/// Star distribution of a product's live ratings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingStatistics {
    pub product_id: Uuid,
    pub summary: RatingSummary,
    /// Keyed `"1"`..`"5"`; empty when the product has no ratings.
    pub distribution: BTreeMap<String, StarDetail>,
    /// Ordered 5 stars down to 1.
    pub distribution_chart: Vec<DistributionPoint>,
}

/// Minimal product reference inside "my ratings".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRating {
    pub id: Uuid,
    pub product: ProductRef,
    pub stars: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyRatingSummary {
    pub total_ratings: i64,
    pub avg_stars_given: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyRatings {
    pub total: i64,
    pub data: Vec<UserRating>,
    pub pagination: MyRatingsQuery,
    pub summary: MyRatingSummary,
}
