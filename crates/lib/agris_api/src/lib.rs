//! # agris_api
//!
//! HTTP API library for the Agris user and catalog services.

pub mod auth_client;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

use std::sync::Arc;

use agris_core::auth::TokenManager;
use agris_core::cache::Cache;
use agris_core::catalog::{ProductRepository, ProductStore, RatingRepository, RatingStore};
use agris_core::models::auth::Role;
use agris_core::rpc::{AUTHENTICATE_PATH, CURRENT_USER_INFO_PATH};
use agris_core::users::{RefreshTokenStore, UserRepository, UserStore};
use axum::Router;
use axum::routing::{delete, get, patch, post, put};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth_client::Authenticator;
use crate::config::{CatalogApiConfig, UserApiConfig};
use crate::handlers::{health, products, ratings, rpc, users};
use crate::middleware::auth::AllowedRoles;

/// Shared state of the user service.
#[derive(Clone)]
pub struct UserState {
    pub config: UserApiConfig,
    pub tokens: TokenManager,
    pub users: UserRepository,
    pub refresh_tokens: RefreshTokenStore,
}

impl UserState {
    pub fn new(config: UserApiConfig, store: Arc<dyn UserStore>, cache: Cache) -> Self {
        Self {
            tokens: TokenManager::new(&config.jwt),
            users: UserRepository::new(store, cache.clone()),
            refresh_tokens: RefreshTokenStore::new(cache),
            config,
        }
    }
}

/// Shared state of the catalog service.
#[derive(Clone)]
pub struct CatalogState {
    pub config: CatalogApiConfig,
    pub products: ProductRepository,
    pub ratings: RatingRepository,
    pub authenticator: Arc<dyn Authenticator>,
}

impl CatalogState {
    pub fn new(
        config: CatalogApiConfig,
        products: Arc<dyn ProductStore>,
        ratings: Arc<dyn RatingStore>,
        cache: Cache,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            config,
            products: ProductRepository::new(products, cache.clone()),
            ratings: RatingRepository::new(ratings, cache),
            authenticator,
        }
    }
}

const ADMIN_ONLY: AllowedRoles = AllowedRoles(&[Role::Admin]);

/// Layers every router carries: deadline, panic recovery, tracing, CORS.
fn finish<S>(router: Router<S>, state: S, request_timeout: std::time::Duration) -> Router
where
    S: Clone + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .layer(axum::middleware::from_fn_with_state(
            request_timeout,
            middleware::deadline::deadline,
        ))
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Public HTTP router of the user service.
pub fn user_router(state: UserState) -> Router {
    // Anonymous callers welcome; a valid token is picked up when present.
    let open = Router::new()
        .route(routes::POST_USERS_LOGIN, post(users::login_handler))
        .route(routes::POST_USERS_REGISTER, post(users::register_handler))
        .route(routes::POST_USERS_REFRESH, post(users::refresh_handler))
        .route(routes::POST_USERS_LOGOUT, post(users::logout_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::optional_auth,
        ));

    let protected = Router::new()
        .route(routes::GET_USERS_ME, get(users::me_handler))
        .route(
            routes::PUT_USERS_ME_PASSWORD,
            put(users::change_password_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let admin = Router::new()
        .route(routes::GET_USERS_LIST, get(users::list_handler))
        .route(routes::PATCH_USERS_ID_ROLE, patch(users::update_role_handler))
        .route(routes::DELETE_USERS_ID, delete(users::delete_handler))
        .layer(axum::middleware::from_fn_with_state(
            ADMIN_ONLY,
            middleware::auth::require_role,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let router = Router::new()
        .route(routes::GET_HEALTH, get(health::user_health))
        .merge(open)
        .merge(protected)
        .merge(admin);

    let timeout = state.config.request_timeout;
    finish(router, state, timeout)
}

/// Internal RPC router of the user service, served on its own listener.
pub fn user_rpc_router(state: UserState) -> Router {
    let open = Router::new().route(AUTHENTICATE_PATH, post(rpc::authenticate_handler));

    let protected = Router::new()
        .route(CURRENT_USER_INFO_PATH, post(rpc::current_user_info_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let router = Router::new().merge(open).merge(protected);
    let timeout = state.config.request_timeout;
    finish(router, state, timeout)
}

/// Public HTTP router of the catalog service.
pub fn catalog_router(state: CatalogState) -> Router {
    let public = Router::new()
        .route(routes::GET_HEALTH, get(health::catalog_health))
        .route(routes::GET_PRODUCTS_LIST, get(products::list_handler))
        .route(routes::GET_PRODUCTS_ID, get(products::get_handler))
        .route(routes::GET_PRODUCTS_ID_SIMILAR, get(products::similar_handler))
        .route(routes::GET_PRODUCTS_ID_RELATED, get(products::related_handler))
        .route(routes::PRODUCTS_RATINGS_ID, get(ratings::list_handler))
        .route(
            routes::GET_PRODUCTS_RATINGS_STATISTIC_ID,
            get(ratings::statistics_handler),
        );

    let protected = Router::new()
        .route(routes::POST_PRODUCTS_ID_RATINGS, post(ratings::create_handler))
        .route(
            routes::PRODUCTS_RATINGS_ID,
            put(ratings::update_handler).delete(ratings::delete_handler),
        )
        .route(routes::GET_RATINGS_ME, get(ratings::my_ratings_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::remote_auth::require_remote_auth,
        ));

    let router = Router::new().merge(public).merge(protected);
    let timeout = state.config.request_timeout;
    finish(router, state, timeout)
}
