//! Local authentication for the user service, which validates the tokens
//! it issued itself.

use agris_core::auth::TokenError;
use agris_core::models::auth::{Principal, Role, TokenKind};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::{bearer_token, missing_token};
use crate::UserState;
use crate::error::AppError;

fn principal_for(state: &UserState, token: &str) -> Result<Principal, AppError> {
    let claims = state
        .tokens
        .validate(token, TokenKind::Access)
        .map_err(|e| match e {
            TokenError::Expired => AppError::Unauthorized("token has expired".into()),
            TokenError::Invalid => AppError::Unauthorized("invalid token".into()),
            TokenError::Signing(detail) => AppError::Internal(detail),
        })?;
    Ok(Principal {
        user_id: claims.user_id,
        role: claims.role,
        token: token.to_string(),
    })
}

/// Axum middleware: verifies the bearer token and injects the caller's
/// [`Principal`] into request extensions.
pub async fn require_auth(
    State(state): State<UserState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or_else(missing_token)?;
    let principal = principal_for(&state, token)?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Like [`require_auth`], but an absent or invalid token lets the request
/// through anonymously.
pub async fn optional_auth(
    State(state): State<UserState>,
    mut request: Request,
    next: Next,
) -> Response {
    let principal = match bearer_token(request.headers()) {
        Some(token) => principal_for(&state, token)
            .inspect_err(|e| debug!(error = %e, "ignoring bad token on optional route"))
            .ok(),
        None => None,
    };
    if let Some(principal) = principal {
        request.extensions_mut().insert(principal);
    }
    next.run(request).await
}

/// Roles admitted by [`require_role`].
#[derive(Debug, Clone, Copy)]
pub struct AllowedRoles(pub &'static [Role]);

/// Rejects callers whose role is not in the allow-list. Must run after an
/// authenticating layer.
pub async fn require_role(
    State(allowed): State<AllowedRoles>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = request
        .extensions()
        .get::<Principal>()
        .ok_or_else(missing_token)?;
    if !allowed.0.contains(&principal.role) {
        debug!(user_id = %principal.user_id, role = %principal.role, "role not allowed");
        return Err(AppError::Forbidden("forbidden".into()));
    }
    Ok(next.run(request).await)
}
