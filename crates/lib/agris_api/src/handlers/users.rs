//! User service request handlers.

use agris_core::models::auth::Principal;
use agris_core::models::page::Page;
use agris_core::models::user::UserQuery;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use uuid::Uuid;

use crate::UserState;
use crate::error::AppResult;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::models::MessageResponse;
use crate::models::users::{
    ChangePasswordRequest, ListUsersParams, LoginRequest, RefreshRequest, RegisterRequest,
    TokenResponse, UpdateRoleRequest, UpdateRoleResponse, UserResponse,
};
use crate::services::{auth, users};

/// `POST /users/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<UserState>,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    Ok(Json(auth::login(&state, body).await?))
}

/// `POST /users/register`: create a `user` account.
pub async fn register_handler(
    State(state): State<UserState>,
    AppJson(body): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = auth::register(&state, body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /users/refresh`: exchange a refresh token for a new pair.
pub async fn refresh_handler(
    State(state): State<UserState>,
    AppJson(body): AppJson<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    Ok(Json(auth::refresh(&state, body).await?))
}

/// `POST /users/logout`: revoke a refresh token.
pub async fn logout_handler(
    State(state): State<UserState>,
    principal: Option<Extension<Principal>>,
    AppJson(body): AppJson<RefreshRequest>,
) -> AppResult<Json<MessageResponse>> {
    let principal = principal.map(|Extension(p)| p);
    Ok(Json(auth::logout(&state, principal.as_ref(), body).await?))
}

/// `GET /users/me`
pub async fn me_handler(
    State(state): State<UserState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<UserResponse>> {
    Ok(Json(users::current_user(&state, &principal).await?))
}

/// `PUT /users/me/password`
pub async fn change_password_handler(
    State(state): State<UserState>,
    Extension(principal): Extension<Principal>,
    AppJson(body): AppJson<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(users::change_password(&state, &principal, body).await?))
}

/// `GET /users/list`: admin only.
pub async fn list_handler(
    State(state): State<UserState>,
    AppQuery(params): AppQuery<ListUsersParams>,
) -> AppResult<Json<Page<UserResponse, UserQuery>>> {
    Ok(Json(users::list_users(&state, &params).await?))
}

/// `PATCH /users/{userId}/role`: admin only.
pub async fn update_role_handler(
    State(state): State<UserState>,
    Extension(principal): Extension<Principal>,
    AppPath(user_id): AppPath<Uuid>,
    AppJson(body): AppJson<UpdateRoleRequest>,
) -> AppResult<Json<UpdateRoleResponse>> {
    let resp = users::update_role(&state, &principal, user_id, &body.role).await?;
    Ok(Json(resp))
}

/// `DELETE /users/{userId}`: admin only.
pub async fn delete_handler(
    State(state): State<UserState>,
    Extension(principal): Extension<Principal>,
    AppPath(user_id): AppPath<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(users::delete_user(&state, &principal, user_id).await?))
}
