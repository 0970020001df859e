//! User account service.

use agris_core::auth::password::{hash_password, verify_password};
use agris_core::error::{ServiceError, ServiceResult};
use agris_core::models::auth::{Principal, Role};
use agris_core::models::page::Page;
use agris_core::models::user::{User, UserQuery};
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::MIN_PASSWORD_LEN;
use super::{non_empty, normalize_page};
use crate::UserState;
use crate::models::MessageResponse;
use crate::models::users::{
    ChangePasswordRequest, ListUsersParams, UpdateRoleResponse, UserResponse,
};

pub const DEFAULT_USER_LIMIT: i64 = 10;
pub const MAX_USER_LIMIT: i64 = 100;

fn require_id(id: Uuid) -> ServiceResult<Uuid> {
    if id.is_nil() {
        return Err(ServiceError::InvalidInput("invalid user id".into()));
    }
    Ok(id)
}

async fn revoke_sessions(state: &UserState, user_id: Uuid) {
    if let Err(e) = state.refresh_tokens.revoke_all(user_id).await {
        warn!(%user_id, error = %e, "failed to revoke refresh tokens");
    }
}

pub async fn current_user(state: &UserState, principal: &Principal) -> ServiceResult<UserResponse> {
    let user = state.users.find_by_id(principal.user_id).await?;
    Ok(UserResponse::from(&user))
}

/// The live account behind a token, or `None` if it is gone.
pub async fn active_user(state: &UserState, user_id: Uuid) -> ServiceResult<Option<User>> {
    match state.users.find_by_id(user_id).await {
        Ok(user) => Ok(Some(user)),
        Err(ServiceError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn normalize_user_query(params: &ListUsersParams) -> ServiceResult<UserQuery> {
    let role = match non_empty(params.role.as_deref()) {
        Some(raw) => Some(
            raw.parse::<Role>()
                .map_err(|_| ServiceError::InvalidInput("invalid role".into()))?,
        ),
        None => None,
    };
    let limit = match params.limit {
        Some(l) if l >= 1 => l.min(MAX_USER_LIMIT),
        _ => DEFAULT_USER_LIMIT,
    };
    Ok(UserQuery {
        page: normalize_page(params.page),
        limit,
        search: non_empty(params.search.as_deref()),
        role,
    })
}

pub async fn list_users(
    state: &UserState,
    params: &ListUsersParams,
) -> ServiceResult<Page<UserResponse, UserQuery>> {
    let query = normalize_user_query(params)?;
    let (total, users) = state.users.list(&query).await?;
    Ok(Page {
        total,
        data: users.iter().map(UserResponse::from).collect(),
        filter: query,
    })
}

/// Admins change other users' roles; changing one's own is refused
/// before any lookup.
pub async fn update_role(
    state: &UserState,
    principal: &Principal,
    target: Uuid,
    role: &str,
) -> ServiceResult<UpdateRoleResponse> {
    let target = require_id(target)?;
    if target == principal.user_id {
        return Err(ServiceError::InvalidInput("cannot change your own role".into()));
    }
    let role: Role = role
        .parse()
        .map_err(|_| ServiceError::InvalidInput("invalid role".into()))?;

    let user = state.users.update_role(target, role).await?;
    info!(user_id = %user.id, %role, by = %principal.user_id, "role updated");
    Ok(UpdateRoleResponse {
        id: user.id,
        email: user.email,
        role: user.role,
        updated_at: user.updated_at,
    })
}

/// Change the caller's password and sign out every other session.
pub async fn change_password(
    state: &UserState,
    principal: &Principal,
    req: ChangePasswordRequest,
) -> ServiceResult<MessageResponse> {
    if req.current_password.is_empty() {
        return Err(ServiceError::InvalidInput("current_password is required".into()));
    }
    if req.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::InvalidInput(format!(
            "new_password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let user = state.users.find_by_id(principal.user_id).await?;
    if !verify_password(&req.current_password, &user.password_hash) {
        return Err(ServiceError::InvalidInput("current password is incorrect".into()));
    }
    let hash = hash_password(&req.new_password)?;
    state.users.update_password(user.id, &hash).await?;
    revoke_sessions(state, user.id).await;

    info!(user_id = %user.id, "password changed");
    Ok(MessageResponse::new("password updated"))
}

/// Soft-delete another account and revoke its refresh tokens.
pub async fn delete_user(
    state: &UserState,
    principal: &Principal,
    target: Uuid,
) -> ServiceResult<MessageResponse> {
    let target = require_id(target)?;
    if target == principal.user_id {
        return Err(ServiceError::InvalidInput("cannot delete your own account".into()));
    }
    let user = state.users.soft_delete(target).await?;
    revoke_sessions(state, user.id).await;

    info!(user_id = %user.id, by = %principal.user_id, "user deleted");
    Ok(MessageResponse::new("user deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::{LoginRequest, RefreshRequest, UserStatus};
    use crate::services::auth;
    use crate::testing::{UserFixture, principal_of, seed_user};

    #[tokio::test]
    async fn current_user_hides_password_hash() {
        let fx = UserFixture::new();
        let user = seed_user(&fx, "ann@example.com", "secret1", Role::User).await;
        let me = current_user(&fx.state, &principal_of(&fx, &user)).await.unwrap();
        assert_eq!(me.id, user.id);
        assert_eq!(me.status, UserStatus::Active);
        let json = serde_json::to_value(&me).unwrap();
        assert!(json.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn active_user_is_none_after_delete() {
        let fx = UserFixture::new();
        let user = seed_user(&fx, "ann@example.com", "secret1", Role::User).await;
        assert!(active_user(&fx.state, user.id).await.unwrap().is_some());

        fx.state.users.soft_delete(user.id).await.unwrap();
        assert!(active_user(&fx.state, user.id).await.unwrap().is_none());
        assert!(active_user(&fx.state, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[test]
    fn user_query_clamps_limit_and_parses_role() {
        let q = normalize_user_query(&ListUsersParams {
            page: Some(0),
            limit: Some(500),
            search: Some("  ann ".into()),
            role: Some("ADMIN".into()),
        })
        .unwrap();
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, MAX_USER_LIMIT);
        assert_eq!(q.search.as_deref(), Some("ann"));
        assert_eq!(q.role, Some(Role::Admin));

        let q = normalize_user_query(&ListUsersParams::default()).unwrap();
        assert_eq!(q.limit, DEFAULT_USER_LIMIT);
        assert_eq!(q.role, None);

        let err = normalize_user_query(&ListUsersParams {
            role: Some("root".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ServiceError::InvalidInput("invalid role".into()));
    }

    #[tokio::test]
    async fn list_users_filters_by_role() {
        let fx = UserFixture::new();
        seed_user(&fx, "ann@example.com", "secret1", Role::Admin).await;
        seed_user(&fx, "bob@example.com", "secret1", Role::User).await;

        let page = list_users(
            &fx.state,
            &ListUsersParams {
                role: Some("user".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].email, "bob@example.com");
    }

    #[tokio::test]
    async fn update_own_role_is_rejected_before_repository() {
        let fx = UserFixture::new();
        let admin = seed_user(&fx, "ann@example.com", "secret1", Role::Admin).await;
        let principal = principal_of(&fx, &admin);
        fx.store.calls.reset();

        let err = update_role(&fx.state, &principal, admin.id, "admin")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::InvalidInput("cannot change your own role".into())
        );
        assert_eq!(fx.store.calls.total(), 0);
    }

    #[tokio::test]
    async fn update_role_promotes_other_user() {
        let fx = UserFixture::new();
        let admin = seed_user(&fx, "ann@example.com", "secret1", Role::Admin).await;
        let bob = seed_user(&fx, "bob@example.com", "secret1", Role::User).await;

        let resp = update_role(&fx.state, &principal_of(&fx, &admin), bob.id, "admin")
            .await
            .unwrap();
        assert_eq!(resp.role, Role::Admin);
        assert_eq!(
            fx.state.users.find_by_id(bob.id).await.unwrap().role,
            Role::Admin
        );
    }

    #[tokio::test]
    async fn update_role_validates_input() {
        let fx = UserFixture::new();
        let admin = seed_user(&fx, "ann@example.com", "secret1", Role::Admin).await;
        let principal = principal_of(&fx, &admin);

        let err = update_role(&fx.state, &principal, Uuid::nil(), "admin")
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::InvalidInput("invalid user id".into()));

        let err = update_role(&fx.state, &principal, Uuid::new_v4(), "owner")
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::InvalidInput("invalid role".into()));

        let err = update_role(&fx.state, &principal, Uuid::new_v4(), "user")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn change_password_revokes_refresh_tokens() {
        let fx = UserFixture::new();
        let user = seed_user(&fx, "ann@example.com", "secret1", Role::User).await;
        let pair = auth::login(
            &fx.state,
            LoginRequest {
                email: "ann@example.com".into(),
                password: "secret1".into(),
            },
        )
        .await
        .unwrap();

        let wrong = change_password(
            &fx.state,
            &principal_of(&fx, &user),
            ChangePasswordRequest {
                current_password: "nope".into(),
                new_password: "secret2".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(wrong, ServiceError::InvalidInput(_)));

        change_password(
            &fx.state,
            &principal_of(&fx, &user),
            ChangePasswordRequest {
                current_password: "secret1".into(),
                new_password: "secret2".into(),
            },
        )
        .await
        .unwrap();

        let err = auth::refresh(
            &fx.state,
            RefreshRequest {
                refresh_token: pair.refresh_token,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated(_)));

        auth::login(
            &fx.state,
            LoginRequest {
                email: "ann@example.com".into(),
                password: "secret2".into(),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn delete_user_soft_deletes_others_only() {
        let fx = UserFixture::new();
        let admin = seed_user(&fx, "ann@example.com", "secret1", Role::Admin).await;
        let bob = seed_user(&fx, "bob@example.com", "secret1", Role::User).await;
        let principal = principal_of(&fx, &admin);

        let err = delete_user(&fx.state, &principal, admin.id).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::InvalidInput("cannot delete your own account".into())
        );

        delete_user(&fx.state, &principal, bob.id).await.unwrap();
        assert!(active_user(&fx.state, bob.id).await.unwrap().is_none());

        let err = delete_user(&fx.state, &principal, bob.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
