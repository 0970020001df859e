//! Client for the user service's authentication RPC.

use std::time::Duration;

use agris_core::models::auth::Principal;
use agris_core::rpc::{
    AUTHENTICATE_PATH, AuthenticateRequest, AuthenticateResponse, CURRENT_USER_INFO_PATH, UserInfo,
};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AuthClientError {
    #[error("auth service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("auth service returned status {0}")]
    Status(u16),
}

/// Remote token verification, as seen by the catalog service.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok` with `valid = false` for a rejected token; `Err` only when the
    /// auth service could not answer.
    async fn authenticate(&self, token: &str) -> Result<AuthenticateResponse, AuthClientError>;

    /// Profile of the caller, authorized with the caller's own bearer token.
    async fn current_user_info(&self, principal: &Principal) -> Result<UserInfo, AuthClientError>;
}

/// [`Authenticator`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpAuthenticator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthenticator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<AuthenticateResponse, AuthClientError> {
        let resp = self
            .client
            .post(self.url(AUTHENTICATE_PATH))
            .json(&AuthenticateRequest {
                token: token.to_string(),
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthClientError::Status(resp.status().as_u16()));
        }
        let body: AuthenticateResponse = resp.json().await?;
        debug!(valid = body.valid, "authenticate answered");
        Ok(body)
    }

    async fn current_user_info(&self, principal: &Principal) -> Result<UserInfo, AuthClientError> {
        let resp = self
            .client
            .post(self.url(CURRENT_USER_INFO_PATH))
            .bearer_auth(&principal.token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthClientError::Status(resp.status().as_u16()));
        }
        Ok(resp.json().await?)
    }
}
