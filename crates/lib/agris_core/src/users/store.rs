//! Relational access to the `users` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::error;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::auth::Role;
use crate::models::page::offset;
use crate::models::user::{NewUser, User, UserQuery};
use crate::search::escape_like;

/// Source of truth for user accounts.
///
/// `find_by_id` and the mutations only see live rows; `find_by_email`
/// also returns soft-deleted ones.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> ServiceResult<User>;
    async fn find_by_email(&self, email: &str) -> ServiceResult<User>;
    async fn insert(&self, user: NewUser) -> ServiceResult<User>;
    async fn update_role(&self, id: Uuid, role: Role) -> ServiceResult<User>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> ServiceResult<User>;
    async fn soft_delete(&self, id: Uuid) -> ServiceResult<User>;
    /// Live users, newest first, plus the unpaged total.
    async fn list(&self, query: &UserQuery) -> ServiceResult<(i64, Vec<User>)>;
}

const COLUMNS: &str = "id, name, email, password_hash, role, created_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = ServiceError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(|e| {
            error!(user_id = %row.id, error = %e, "corrupt role column");
            ServiceError::internal()
        })?;
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Postgres-backed [`UserStore`].
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &UserQuery) {
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND email ILIKE ")
            .push_bind(format!("%{}%", escape_like(search)));
    }
    if let Some(role) = query.role {
        qb.push(" AND role = ").push_bind(role.as_str());
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> ServiceResult<User> {
        let row: UserRow = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_by_email(&self, email: &str) -> ServiceResult<User> {
        let row: UserRow = sqlx::query_as(&format!("SELECT {COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn insert(&self, user: NewUser) -> ServiceResult<User> {
        let row: UserRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match ServiceError::from(e) {
            ServiceError::Conflict(_) => ServiceError::Conflict("email already exists".into()),
            other => other,
        })?;
        row.try_into()
    }

    async fn update_role(&self, id: Uuid, role: Role) -> ServiceResult<User> {
        let row: UserRow = sqlx::query_as(&format!(
            r#"
            UPDATE users SET role = $2, updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> ServiceResult<User> {
        let row: UserRow = sqlx::query_as(&format!(
            r#"
            UPDATE users SET password_hash = $2, updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn soft_delete(&self, id: Uuid) -> ServiceResult<User> {
        let row: UserRow = sqlx::query_as(&format!(
            r#"
            UPDATE users SET deleted_at = now(), updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn list(&self, query: &UserQuery) -> ServiceResult<(i64, Vec<User>)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(format!(
            "SELECT {COLUMNS} FROM users WHERE deleted_at IS NULL"
        ));
        push_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(offset(query.page, query.limit));
        let rows: Vec<UserRow> = select.build_query_as().fetch_all(&self.pool).await?;

        let users = rows
            .into_iter()
            .map(User::try_from)
            .collect::<ServiceResult<Vec<_>>>()?;
        Ok((total, users))
    }
}
