//! Cache key namespace.
//!
//! Every key starts with a per-entity prefix so one write can clear all
//! derived entries with a prefix glob. Keys for listings carry every
//! parameter that shapes the result.

use std::time::Duration;

use uuid::Uuid;

use crate::models::catalog::{MyRatingsQuery, ProductQuery, RatingQuery, RelationKind, RelationQuery};
use crate::search::normalize_search_text;

pub const PRODUCT: &str = "product:";
pub const PRODUCT_LIST: &str = "productlist:";
pub const PRODUCT_SIMILAR: &str = "productsimilar:";
pub const PRODUCT_RELATED: &str = "productrelated:";
pub const RATINGS_OF_USER: &str = "rateofuser:";
pub const RATINGS_OF_PRODUCT: &str = "rateofproduct:";
pub const RATING_STATISTICS: &str = "ratestatistic:";
pub const USER: &str = "user:";
pub const USER_EMAIL: &str = "user:email:";
pub const REFRESH_TOKENS: &str = "refresh_tokens:";

/// Products, listings and rating aggregates.
pub const CATALOG_TTL: Duration = Duration::from_secs(60 * 60);

/// User records by id and by email.
pub const USER_TTL: Duration = Duration::from_secs(30 * 60);

/// Rolling lifetime of a user's refresh-token set.
pub const REFRESH_RECORD_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

pub fn product(id: Uuid) -> String {
    format!("{PRODUCT}{id}")
}

/// Search text is keyed in its folded form, so inputs that match the same
/// rows share one entry.
pub fn product_list(q: &ProductQuery) -> String {
    let search = q
        .search
        .as_deref()
        .map(normalize_search_text)
        .unwrap_or_default();
    let categories = q
        .category_ids
        .iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{PRODUCT_LIST}page:{}:limit:{}:search:{}:cat:{}:price:{}-{}:rate:{}-{}:sort:{}:{}",
        q.page,
        q.limit,
        search,
        categories,
        opt(q.min_price),
        opt(q.max_price),
        opt(q.min_rate),
        opt(q.max_rate),
        q.sort.column(),
        q.order.sql(),
    )
}

pub fn product_list_pattern() -> String {
    format!("{PRODUCT_LIST}*")
}

pub fn relations(kind: RelationKind, product_id: Uuid, q: RelationQuery) -> String {
    let prefix = match kind {
        RelationKind::Similar => PRODUCT_SIMILAR,
        RelationKind::Related => PRODUCT_RELATED,
    };
    format!("{prefix}product:{product_id}:page:{}:limit:{}", q.page, q.limit)
}

pub fn ratings_of_product(q: &RatingQuery) -> String {
    format!(
        "{RATINGS_OF_PRODUCT}{}:page:{}:limit:{}:star:{}:sort:{}",
        q.product_id,
        q.page,
        q.limit,
        q.stars.unwrap_or(0),
        q.sort,
    )
}

pub fn ratings_of_product_pattern(product_id: Uuid) -> String {
    format!("{RATINGS_OF_PRODUCT}{product_id}:*")
}

pub fn rating_statistics(product_id: Uuid) -> String {
    format!("{RATING_STATISTICS}{product_id}")
}

pub fn ratings_of_user(user_id: Uuid, q: &MyRatingsQuery) -> String {
    format!(
        "{RATINGS_OF_USER}{user_id}:page:{}:limit:{}:sort:{}",
        q.page, q.limit, q.sort
    )
}

pub fn ratings_of_user_pattern(user_id: Uuid) -> String {
    format!("{RATINGS_OF_USER}{user_id}:*")
}

pub fn user(id: Uuid) -> String {
    format!("{USER}{id}")
}

pub fn user_email(email: &str) -> String {
    format!("{USER_EMAIL}{email}")
}

pub fn refresh_tokens(user_id: Uuid) -> String {
    format!("{REFRESH_TOKENS}{user_id}")
}

fn opt(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}
