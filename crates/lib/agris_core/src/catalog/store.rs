//! Relational access to products, categories and ratings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::catalog::{
    Category, MyRatingsQuery, NewRating, Product, ProductQuery, ProductRef, ProductSummary,
    Rating, RatingChange, RatingQuery, RelationKind, RelationQuery, UserRating,
};
use crate::models::page::offset;
use crate::search::{escape_like, normalize_search_text};

/// Read side of the product catalog. Soft-deleted products are invisible.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn list(&self, query: &ProductQuery) -> ServiceResult<(i64, Vec<Product>)>;
    async fn get(&self, id: Uuid) -> ServiceResult<Product>;
    /// Products linked from `id` by a `kind` edge, best rated first.
    async fn relations(
        &self,
        id: Uuid,
        kind: RelationKind,
        query: RelationQuery,
    ) -> ServiceResult<(i64, Vec<Product>)>;
}

/// One page of a user's ratings plus totals across all of them.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRatingPage {
    pub total: i64,
    pub star_sum: i64,
    pub data: Vec<UserRating>,
}

/// Ratings. Every write recomputes the product's `average_rating` and
/// `total_ratings` in the same transaction.
#[async_trait]
pub trait RatingStore: Send + Sync {
    async fn find(&self, id: Uuid) -> ServiceResult<Rating>;
    async fn find_for_user_and_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> ServiceResult<Option<Rating>>;
    async fn create(&self, rating: NewRating) -> ServiceResult<RatingChange>;
    async fn update(
        &self,
        id: Uuid,
        stars: i32,
        comment: Option<String>,
    ) -> ServiceResult<RatingChange>;
    /// Soft delete.
    async fn delete(&self, id: Uuid) -> ServiceResult<RatingChange>;
    async fn list_for_product(&self, query: &RatingQuery) -> ServiceResult<(i64, Vec<Rating>)>;
    /// Live-rating counts per star (`[1★, 2★, 3★, 4★, 5★]`); `NotFound` if
    /// the product does not exist.
    async fn star_counts(&self, product_id: Uuid) -> ServiceResult<[i64; 5]>;
    async fn list_for_user(
        &self,
        user_id: Uuid,
        query: &MyRatingsQuery,
    ) -> ServiceResult<UserRatingPage>;
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.name, p.search_name, p.description, p.price, p.category_id,
           p.average_rating, p.total_ratings, p.created_at, p.updated_at,
           c.id AS c_id, c.name AS c_name, c.description AS c_description,
           c.created_at AS c_created_at, c.updated_at AS c_updated_at
    FROM products p
    LEFT JOIN categories c ON c.id = p.category_id
"#;

const RATING_COLUMNS: &str = "id, product_id, user_id, stars, comment, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    search_name: String,
    description: Option<String>,
    price: f64,
    category_id: Uuid,
    average_rating: f64,
    total_ratings: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    c_id: Option<Uuid>,
    c_name: Option<String>,
    c_description: Option<String>,
    c_created_at: Option<DateTime<Utc>>,
    c_updated_at: Option<DateTime<Utc>>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        let category = match (row.c_id, row.c_name, row.c_created_at, row.c_updated_at) {
            (Some(id), Some(name), Some(created_at), Some(updated_at)) => Some(Category {
                id,
                name,
                description: row.c_description,
                created_at,
                updated_at,
            }),
            _ => None,
        };
        Product {
            id: row.id,
            name: row.name,
            search_name: row.search_name,
            description: row.description,
            price: row.price,
            category_id: row.category_id,
            average_rating: row.average_rating,
            total_ratings: row.total_ratings,
            created_at: row.created_at,
            updated_at: row.updated_at,
            category,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RatingRow {
    id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
    stars: i32,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RatingRow> for Rating {
    fn from(row: RatingRow) -> Self {
        Rating {
            id: row.id,
            product_id: row.product_id,
            user_id: row.user_id,
            stars: row.stars,
            comment: row.comment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRatingRow {
    id: Uuid,
    stars: i32,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    product_id: Uuid,
    product_name: String,
}

impl From<UserRatingRow> for UserRating {
    fn from(row: UserRatingRow) -> Self {
        UserRating {
            id: row.id,
            product: ProductRef {
                id: row.product_id,
                name: row.product_name,
            },
            stars: row.stars,
            comment: row.comment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductSummaryRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    price: f64,
    average_rating: f64,
    total_ratings: i32,
}

impl From<ProductSummaryRow> for ProductSummary {
    fn from(row: ProductSummaryRow) -> Self {
        ProductSummary {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            average_rating: row.average_rating,
            total_ratings: row.total_ratings,
        }
    }
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// Postgres-backed [`ProductStore`] and [`RatingStore`].
#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
    if let Some(search) = query.search.as_deref() {
        let needle = normalize_search_text(search);
        if !needle.is_empty() {
            qb.push(" AND p.search_name LIKE ")
                .push_bind(format!("%{}%", escape_like(&needle)));
        }
    }
    if !query.category_ids.is_empty() {
        qb.push(" AND p.category_id = ANY(")
            .push_bind(query.category_ids.clone())
            .push(")");
    }
    if let Some(min) = query.min_price {
        qb.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = query.max_price {
        qb.push(" AND p.price <= ").push_bind(max);
    }
    if let Some(min) = query.min_rate {
        qb.push(" AND p.average_rating >= ").push_bind(min);
    }
    if let Some(max) = query.max_rate {
        qb.push(" AND p.average_rating <= ").push_bind(max);
    }
}

/// Recompute a product's rating aggregates from its live ratings.
async fn refresh_aggregates(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
) -> ServiceResult<ProductSummary> {
    let row: ProductSummaryRow = sqlx::query_as(
        r#"
        UPDATE products SET
            average_rating = COALESCE((
                SELECT ROUND(AVG(stars)::numeric, 2)::float8
                FROM ratings WHERE product_id = $1 AND deleted_at IS NULL
            ), 0),
            total_ratings = (
                SELECT COUNT(*)::int
                FROM ratings WHERE product_id = $1 AND deleted_at IS NULL
            ),
            updated_at = now()
        WHERE id = $1
        RETURNING id, name, description, price, average_rating, total_ratings
        "#,
    )
    .bind(product_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.into())
}

#[async_trait]
impl ProductStore for PgCatalogStore {
    async fn list(&self, query: &ProductQuery) -> ServiceResult<(i64, Vec<Product>)> {
        let mut count =
            QueryBuilder::new("SELECT COUNT(*) FROM products p WHERE p.deleted_at IS NULL");
        push_product_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(PRODUCT_SELECT);
        select.push(" WHERE p.deleted_at IS NULL");
        push_product_filters(&mut select, query);
        // Sort column and direction come from closed enums, never from input.
        select
            .push(format!(
                " ORDER BY p.{} {}, p.id LIMIT ",
                query.sort.column(),
                query.order.sql()
            ))
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(offset(query.page, query.limit));
        let rows: Vec<ProductRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok((total, rows.into_iter().map(Product::from).collect()))
    }

    async fn get(&self, id: Uuid) -> ServiceResult<Product> {
        let row: ProductRow = sqlx::query_as(&format!(
            "{PRODUCT_SELECT} WHERE p.id = $1 AND p.deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn relations(
        &self,
        id: Uuid,
        kind: RelationKind,
        query: RelationQuery,
    ) -> ServiceResult<(i64, Vec<Product>)> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM products p
            INNER JOIN product_related pr ON pr.related_id = p.id
            WHERE pr.product_id = $1 AND pr.relation_type = $2 AND p.deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        if total == 0 {
            return Ok((0, Vec::new()));
        }

        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            r#"
            {PRODUCT_SELECT}
            INNER JOIN product_related pr ON pr.related_id = p.id
            WHERE pr.product_id = $1 AND pr.relation_type = $2 AND p.deleted_at IS NULL
            ORDER BY p.average_rating DESC, p.created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(id)
        .bind(kind.as_str())
        .bind(query.limit)
        .bind(offset(query.page, query.limit))
        .fetch_all(&self.pool)
        .await?;

        Ok((total, rows.into_iter().map(Product::from).collect()))
    }
}

#[async_trait]
impl RatingStore for PgCatalogStore {
    async fn find(&self, id: Uuid) -> ServiceResult<Rating> {
        let row: RatingRow = sqlx::query_as(&format!(
            "SELECT {RATING_COLUMNS} FROM ratings WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn find_for_user_and_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> ServiceResult<Option<Rating>> {
        let row: Option<RatingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {RATING_COLUMNS} FROM ratings
            WHERE user_id = $1 AND product_id = $2 AND deleted_at IS NULL
            "#
        ))
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Rating::from))
    }

    async fn create(&self, rating: NewRating) -> ServiceResult<RatingChange> {
        let mut tx = self.pool.begin().await?;

        // Lock the product row so concurrent writes recompute in order.
        let exists: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM products WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(rating.product_id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_none() {
            return Err(ServiceError::not_found());
        }

        let row: RatingRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO ratings (id, product_id, user_id, stars, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {RATING_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(rating.product_id)
        .bind(rating.user_id)
        .bind(rating.stars)
        .bind(&rating.comment)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match ServiceError::from(e) {
            ServiceError::Conflict(_) => {
                ServiceError::Conflict("you have already rated this product".into())
            }
            other => other,
        })?;

        let product = refresh_aggregates(&mut tx, rating.product_id).await?;
        tx.commit().await?;

        Ok(RatingChange {
            rating: row.into(),
            product,
        })
    }

    async fn update(
        &self,
        id: Uuid,
        stars: i32,
        comment: Option<String>,
    ) -> ServiceResult<RatingChange> {
        let mut tx = self.pool.begin().await?;

        let row: RatingRow = sqlx::query_as(&format!(
            r#"
            UPDATE ratings SET stars = $2, comment = $3, updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {RATING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(stars)
        .bind(&comment)
        .fetch_one(&mut *tx)
        .await?;

        let product = refresh_aggregates(&mut tx, row.product_id).await?;
        tx.commit().await?;

        Ok(RatingChange {
            rating: row.into(),
            product,
        })
    }

    async fn delete(&self, id: Uuid) -> ServiceResult<RatingChange> {
        let mut tx = self.pool.begin().await?;

        let row: RatingRow = sqlx::query_as(&format!(
            r#"
            UPDATE ratings SET deleted_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {RATING_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let product = refresh_aggregates(&mut tx, row.product_id).await?;
        tx.commit().await?;

        Ok(RatingChange {
            rating: row.into(),
            product,
        })
    }

    async fn list_for_product(&self, query: &RatingQuery) -> ServiceResult<(i64, Vec<Rating>)> {
        let mut count = QueryBuilder::new(
            "SELECT COUNT(*) FROM ratings r WHERE r.deleted_at IS NULL AND r.product_id = ",
        );
        count.push_bind(query.product_id);
        if let Some(stars) = query.stars {
            count.push(" AND r.stars = ").push_bind(stars);
        }
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(
            "SELECT r.id, r.product_id, r.user_id, r.stars, r.comment, r.created_at, r.updated_at \
             FROM ratings r WHERE r.deleted_at IS NULL AND r.product_id = ",
        );
        select.push_bind(query.product_id);
        if let Some(stars) = query.stars {
            select.push(" AND r.stars = ").push_bind(stars);
        }
        select
            .push(format!(" ORDER BY {} LIMIT ", query.sort.order_by()))
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(offset(query.page, query.limit));
        let rows: Vec<RatingRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok((total, rows.into_iter().map(Rating::from).collect()))
    }

    async fn star_counts(&self, product_id: Uuid) -> ServiceResult<[i64; 5]> {
        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM products WHERE id = $1 AND deleted_at IS NULL")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
        if exists.is_none() {
            return Err(ServiceError::not_found());
        }

        let rows: Vec<(i32, i64)> = sqlx::query_as(
            r#"
            SELECT stars, COUNT(*)
            FROM ratings
            WHERE product_id = $1 AND deleted_at IS NULL
            GROUP BY stars
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = [0i64; 5];
        for (stars, count) in rows {
            if (1..=5).contains(&stars) {
                counts[(stars - 1) as usize] = count;
            }
        }
        Ok(counts)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        query: &MyRatingsQuery,
    ) -> ServiceResult<UserRatingPage> {
        let (total, star_sum): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(r.stars), 0)
            FROM ratings r
            JOIN products p ON p.id = r.product_id
            WHERE r.user_id = $1 AND r.deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        if total == 0 {
            return Ok(UserRatingPage {
                total: 0,
                star_sum: 0,
                data: Vec::new(),
            });
        }

        let rows: Vec<UserRatingRow> = sqlx::query_as(&format!(
            r#"
            SELECT r.id, r.stars, r.comment, r.created_at, r.updated_at,
                   p.id AS product_id, p.name AS product_name
            FROM ratings r
            JOIN products p ON p.id = r.product_id
            WHERE r.user_id = $1 AND r.deleted_at IS NULL
            ORDER BY {}
            LIMIT $2 OFFSET $3
            "#,
            query.sort.order_by()
        ))
        .bind(user_id)
        .bind(query.limit)
        .bind(offset(query.page, query.limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(UserRatingPage {
            total,
            star_sum,
            data: rows.into_iter().map(UserRating::from).collect(),
        })
    }
}
