//! Internal RPC handlers, called by the catalog service.

use agris_core::models::auth::{Principal, TokenKind};
use agris_core::rpc::{AuthenticateRequest, AuthenticateResponse, UserInfo};
use axum::extract::State;
use axum::{Extension, Json};
use tracing::debug;

use crate::UserState;
use crate::error::AppResult;
use crate::extract::AppJson;
use crate::services::users;

/// `Authenticate`: verify a token and confirm its user is still live.
///
/// Rejected tokens answer `200 {"valid": false}`; only a failure of this
/// service itself is an error status.
pub async fn authenticate_handler(
    State(state): State<UserState>,
    AppJson(body): AppJson<AuthenticateRequest>,
) -> AppResult<Json<AuthenticateResponse>> {
    if body.token.is_empty() {
        return Ok(Json(AuthenticateResponse::invalid()));
    }
    let claims = match state.tokens.validate(&body.token, TokenKind::Access) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "authenticate: token rejected");
            return Ok(Json(AuthenticateResponse::invalid()));
        }
    };
    let resp = match users::active_user(&state, claims.user_id).await? {
        Some(user) => AuthenticateResponse::valid(user.id, user.role),
        None => {
            debug!(user_id = %claims.user_id, "authenticate: user gone");
            AuthenticateResponse::invalid()
        }
    };
    Ok(Json(resp))
}

/// `GetCurrentUserInfo`: profile of the bearer.
pub async fn current_user_info_handler(
    State(state): State<UserState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<UserInfo>> {
    let user = users::current_user(&state, &principal).await?;
    Ok(Json(UserInfo {
        id: user.id,
        name: user.name,
        email: user.email,
    }))
}
