//! Fixtures for service and router tests: in-memory stores and cache, a
//! table-driven authenticator and a one-shot request helper.
//!
//! Enabled for this crate's own tests and, through the `test-utils`
//! feature, for its integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use agris_core::cache::Cache;
use agris_core::config::{Environment, JwtSettings};
use agris_core::models::auth::{Principal, Role, TokenKind, TokenSubject};
use agris_core::models::user::User;
use agris_core::rpc::{AuthenticateResponse, UserInfo};
use agris_core::testing::{InMemoryCatalogStore, InMemoryUserStore, new_user_with_password};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;
use uuid::Uuid;

use crate::auth_client::{AuthClientError, Authenticator};
use crate::config::{
    CatalogApiConfig, DEFAULT_AUTH_TIMEOUT, DEFAULT_REDIS_URL, DEFAULT_REQUEST_TIMEOUT,
    UserApiConfig,
};
use crate::{CatalogState, UserState};

pub const SECRET: &str = "0123456789abcdef0123456789abcdef";

pub fn user_config() -> UserApiConfig {
    UserApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        rpc_bind_addr: "127.0.0.1:0".into(),
        pg_connection_url: String::new(),
        redis_url: DEFAULT_REDIS_URL.into(),
        environment: Environment::Development,
        jwt: JwtSettings::new(SECRET),
        request_timeout: DEFAULT_REQUEST_TIMEOUT,
    }
}

pub fn catalog_config() -> CatalogApiConfig {
    CatalogApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        pg_connection_url: String::new(),
        redis_url: DEFAULT_REDIS_URL.into(),
        auth_service_url: "http://127.0.0.1:9005".into(),
        auth_timeout: DEFAULT_AUTH_TIMEOUT,
        request_timeout: DEFAULT_REQUEST_TIMEOUT,
    }
}

pub struct UserFixture {
    pub state: UserState,
    pub store: Arc<InMemoryUserStore>,
}

impl UserFixture {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryUserStore::new());
        let state = UserState::new(user_config(), store.clone(), Cache::in_memory());
        Self { state, store }
    }

    pub fn router(&self) -> Router {
        crate::user_router(self.state.clone())
    }

    pub fn rpc_router(&self) -> Router {
        crate::user_rpc_router(self.state.clone())
    }
}

impl Default for UserFixture {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn seed_user(fx: &UserFixture, email: &str, password: &str, role: Role) -> User {
    fx.state
        .users
        .create(new_user_with_password(email, password, role))
        .await
        .unwrap()
}

/// Principal carrying a real access token for `user`.
pub fn principal_of(fx: &UserFixture, user: &User) -> Principal {
    let subject = TokenSubject {
        user_id: user.id,
        email: user.email.clone(),
        role: user.role,
    };
    let token = fx.state.tokens.issue(&subject, TokenKind::Access).unwrap();
    Principal {
        user_id: user.id,
        role: user.role,
        token: token.token,
    }
}

/// Authenticator backed by a token table instead of the user service.
#[derive(Debug, Default)]
pub struct StubAuthenticator {
    sessions: Mutex<HashMap<String, (UserInfo, Role)>>,
    down: AtomicBool,
    authenticate_calls: AtomicU32,
    info_calls: AtomicU32,
}

impl StubAuthenticator {
    /// Register a caller and return its principal.
    pub fn sign_in(&self, name: &str, role: Role) -> Principal {
        let id = Uuid::new_v4();
        let token = format!("token-{id}");
        let info = UserInfo {
            id,
            name: name.into(),
            email: format!("{id}@example.com"),
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(token.clone(), (info, role));
        Principal {
            user_id: id,
            role,
            token,
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn authenticate_calls(&self) -> u32 {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    pub fn info_calls(&self) -> u32 {
        self.info_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for StubAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<AuthenticateResponse, AuthClientError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(AuthClientError::Status(503));
        }
        Ok(match self.sessions.lock().unwrap().get(token) {
            Some((info, role)) => AuthenticateResponse::valid(info.id, *role),
            None => AuthenticateResponse::invalid(),
        })
    }

    async fn current_user_info(&self, principal: &Principal) -> Result<UserInfo, AuthClientError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(AuthClientError::Status(503));
        }
        self.sessions
            .lock()
            .unwrap()
            .get(&principal.token)
            .map(|(info, _)| info.clone())
            .ok_or(AuthClientError::Status(401))
    }
}

pub struct CatalogFixture {
    pub state: CatalogState,
    pub store: Arc<InMemoryCatalogStore>,
    pub auth: Arc<StubAuthenticator>,
}

impl CatalogFixture {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryCatalogStore::new());
        let auth = Arc::new(StubAuthenticator::default());
        let state = CatalogState::new(
            catalog_config(),
            store.clone(),
            store.clone(),
            Cache::in_memory(),
            auth.clone(),
        );
        Self { state, store, auth }
    }

    pub fn router(&self) -> Router {
        crate::catalog_router(self.state.clone())
    }
}

impl Default for CatalogFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Send one request and return status + parsed JSON body (`Null` if empty).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    (status, json)
}
