//! Agris catalog service binary.
//!
//! Products and ratings. Authenticated routes are checked against the
//! user service's RPC listener on every request.

use std::sync::Arc;

use agris_api::auth_client::HttpAuthenticator;
use agris_api::config::CatalogApiConfig;
use agris_core::cache::{Cache, RedisCache};
use agris_core::catalog::PgCatalogStore;
use clap::{Parser, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CacheKind {
    Redis,
    Memory,
}

/// CLI arguments for the catalog service.
#[derive(Parser, Debug)]
#[command(name = "agris_catalog_server", about = "Agris catalog service")]
struct Args {
    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,

    /// Cache backend.
    #[arg(long, value_enum, env = "CACHE_BACKEND", default_value_t = CacheKind::Redis)]
    cache: CacheKind,

    /// Skip running migrations at startup.
    #[arg(long, default_value_t = false)]
    no_migrate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,agris_api=debug,agris_core=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let config = CatalogApiConfig::from_env()?;
    config.validate()?;

    info!(
        bind_addr = %config.bind_addr,
        auth_service_url = %config.auth_service_url,
        auth_timeout_ms = config.auth_timeout.as_millis() as u64,
        "starting agris_catalog_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    if args.no_migrate {
        warn!("skipping database migrations");
    } else {
        info!("running database migrations");
        agris_core::migrate::migrate_catalog(&pool).await?;
    }

    let cache = match args.cache {
        CacheKind::Redis => {
            let redis = RedisCache::connect(&config.redis_url).await?;
            redis.ping().await?;
            info!(redis_url = %config.redis_url, "connected to redis");
            Cache::new(redis)
        }
        CacheKind::Memory => {
            warn!("using in-process cache");
            Cache::in_memory()
        }
    };

    let authenticator = HttpAuthenticator::new(&config.auth_service_url, config.auth_timeout)?;
    let store = Arc::new(PgCatalogStore::new(pool));
    let state = agris_api::CatalogState::new(
        config.clone(),
        store.clone(),
        store,
        cache,
        Arc::new(authenticator),
    );

    let app = agris_api::catalog_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP API listening");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                return;
            }
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
