//! Agris user service binary.
//!
//! Serves the public account API and the internal authentication RPC on
//! two listeners. Settings come from the environment (see
//! [`agris_api::config::UserApiConfig::from_env`]); the flags below only
//! cover process-level knobs.

use std::sync::Arc;

use agris_api::config::UserApiConfig;
use agris_core::cache::{Cache, RedisCache};
use agris_core::users::PgUserStore;
use clap::{Parser, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CacheKind {
    Redis,
    /// Process-local cache. Refresh tokens do not survive a restart.
    Memory,
}

/// CLI arguments for the user service.
#[derive(Parser, Debug)]
#[command(name = "agris_user_server", about = "Agris user service")]
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

    let config = UserApiConfig::from_env()?;
    config.validate()?;

    info!(
        environment = %config.environment,
        bind_addr = %config.bind_addr,
        rpc_bind_addr = %config.rpc_bind_addr,
        "starting agris_user_server"
    );

    info!(max_connections = args.max_connections, "configuring connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    if args.no_migrate {
        warn!("skipping database migrations");
    } else {
        info!("running database migrations");
        agris_core::migrate::migrate_users(&pool).await?;
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

    let state = agris_api::UserState::new(config.clone(), Arc::new(PgUserStore::new(pool)), cache);

    let app = agris_api::user_router(state.clone());
    let rpc_app = agris_api::user_rpc_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    let rpc_listener = tokio::net::TcpListener::bind(&config.rpc_bind_addr).await?;
    let rpc_addr = rpc_listener.local_addr()?;

    info!(addr = %local_addr, "HTTP API listening");
    info!(addr = %rpc_addr, "auth RPC listening");

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

    // RPC listener runs on its own task; the HTTP API on the main one.
    let rpc_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(rpc_listener, rpc_app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        }
    });

    let api_result = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await;

    // When the HTTP API exits for any reason, stop the RPC listener too.
    shutdown.cancel();
    let _ = rpc_handle.await;

    api_result?;

    Ok(())
}
