//! Authentication for the catalog service, delegated to the user service.
//!
//! Every well-formed bearer token is sent to the remote authenticator, so
//! token validation lives in one place. The gate fails closed: an auth
//! service that cannot be reached rejects the request exactly like an
//! invalid token.

use agris_core::models::auth::Principal;
use agris_core::rpc::AuthenticateResponse;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::{bearer_token, missing_token};
use crate::CatalogState;
use crate::error::AppError;

pub async fn require_remote_auth(
    State(state): State<CatalogState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())
        .ok_or_else(missing_token)?
        .to_string();

    let verdict = match state.authenticator.authenticate(&token).await {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(error = %e, "auth service unavailable, rejecting request");
            return Err(AppError::Unauthorized("unauthorized".into()));
        }
    };

    let AuthenticateResponse {
        valid: true,
        user_id: Some(user_id),
        role: Some(role),
    } = verdict
    else {
        debug!("auth service rejected token");
        return Err(AppError::Unauthorized("invalid or expired token".into()));
    };

    request.extensions_mut().insert(Principal {
        user_id,
        role,
        token,
    });
    Ok(next.run(request).await)
}
