//! Embedded database migrations, one set per service.
//!
//! Versions are disjoint across the two sets and each migrator ignores
//! versions it does not know, so both services may share a database.

use sqlx::PgPool;
use sqlx::migrate::MigrateError;

/// Run pending migrations for the user service (`migrations/users`).
pub async fn migrate_users(pool: &PgPool) -> Result<(), MigrateError> {
    let mut migrator = sqlx::migrate!("./migrations/users");
    migrator.set_ignore_missing(true);
    migrator.run(pool).await
}

/// Run pending migrations for the catalog service (`migrations/catalog`).
pub async fn migrate_catalog(pool: &PgPool) -> Result<(), MigrateError> {
    let mut migrator = sqlx::migrate!("./migrations/catalog");
    migrator.set_ignore_missing(true);
    migrator.run(pool).await
}
