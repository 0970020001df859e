//! Authentication service: login, registration and refresh-token rotation.

use agris_core::auth::password::{hash_password, verify_password};
use agris_core::auth::TokenError;
use agris_core::error::{ServiceError, ServiceResult};
use agris_core::models::auth::{Principal, Role, TokenKind, TokenSubject};
use agris_core::models::user::{NewUser, User};
use tracing::{info, warn};

use crate::UserState;
use crate::models::MessageResponse;
use crate::models::users::{
    LoginRequest, RefreshRequest, RegisterRequest, TokenResponse, TokenUser, UserResponse,
};

pub const MIN_NAME_LEN: usize = 6;
pub const MIN_PASSWORD_LEN: usize = 6;

fn invalid_credentials() -> ServiceError {
    ServiceError::Unauthenticated("invalid email or password".into())
}

/// Emails are compared trimmed and lowercased.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

// ---------------------------------------------------------------------------
// Token pairs
// ---------------------------------------------------------------------------

/// Issue an access + refresh pair for `user` and record the refresh token.
async fn issue_pair(state: &UserState, user: &User) -> ServiceResult<TokenResponse> {
    let subject = TokenSubject {
        user_id: user.id,
        email: user.email.clone(),
        role: user.role,
    };
    let signing = |e: TokenError| ServiceError::Internal(e.to_string());
    let access = state
        .tokens
        .issue(&subject, TokenKind::Access)
        .map_err(signing)?;
    let refresh = state
        .tokens
        .issue(&subject, TokenKind::Refresh)
        .map_err(signing)?;

    // The pair is still usable for its access lifetime without a record.
    if let Err(e) = state
        .refresh_tokens
        .save(user.id, &refresh.token, refresh.expires_at)
        .await
    {
        warn!(user_id = %user.id, error = %e, "failed to record refresh token");
    }

    Ok(TokenResponse {
        access_token: access.token,
        refresh_token: refresh.token,
        token_type: "Bearer".into(),
        expires_in: state.tokens.access_ttl().num_seconds(),
        user: TokenUser {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        },
    })
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

pub async fn login(state: &UserState, req: LoginRequest) -> ServiceResult<TokenResponse> {
    let email = normalize_email(&req.email);
    if email.is_empty() {
        return Err(ServiceError::InvalidInput("email is required".into()));
    }
    if req.password.is_empty() {
        return Err(ServiceError::InvalidInput("password is required".into()));
    }

    let user = match state.users.find_by_email(&email).await {
        Ok(user) => user,
        Err(ServiceError::NotFound(_)) => return Err(invalid_credentials()),
        Err(e) => return Err(e),
    };
    if user.is_deleted() {
        return Err(ServiceError::Forbidden("account is locked".into()));
    }
    if !verify_password(&req.password, &user.password_hash) {
        return Err(invalid_credentials());
    }

    info!(user_id = %user.id, "user logged in");
    issue_pair(state, &user).await
}

/// Exchange a refresh token for a new pair. The presented token is
/// consumed, so each refresh token works once.
pub async fn refresh(state: &UserState, req: RefreshRequest) -> ServiceResult<TokenResponse> {
    if req.refresh_token.is_empty() {
        return Err(ServiceError::InvalidInput("refresh_token is required".into()));
    }
    let claims = state
        .tokens
        .validate(&req.refresh_token, TokenKind::Refresh)
        .map_err(|e| match e {
            TokenError::Expired => {
                ServiceError::Unauthenticated("refresh token has expired".into())
            }
            _ => ServiceError::Unauthenticated("invalid refresh token".into()),
        })?;

    match state
        .refresh_tokens
        .consume(claims.user_id, &req.refresh_token)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!(user_id = %claims.user_id, "refresh token reused or revoked");
            return Err(ServiceError::Unauthenticated(
                "refresh token has been revoked".into(),
            ));
        }
        Err(e) => {
            warn!(user_id = %claims.user_id, error = %e, "refresh record unavailable");
            return Err(ServiceError::Unauthenticated("invalid refresh token".into()));
        }
    }

    let user = match state.users.find_by_id(claims.user_id).await {
        Ok(user) => user,
        Err(ServiceError::NotFound(_)) => {
            return Err(ServiceError::Unauthenticated("invalid refresh token".into()));
        }
        Err(e) => return Err(e),
    };
    issue_pair(state, &user).await
}

/// Revoke one refresh token. Succeeds whether or not the token was known.
pub async fn logout(
    state: &UserState,
    principal: Option<&Principal>,
    req: RefreshRequest,
) -> ServiceResult<MessageResponse> {
    // An authenticated caller may only revoke their own tokens.
    if !req.refresh_token.is_empty()
        && let Ok(claims) = state
            .tokens
            .validate(&req.refresh_token, TokenKind::Refresh)
        && principal.is_none_or(|p| p.user_id == claims.user_id)
        && let Err(e) = state
            .refresh_tokens
            .revoke(claims.user_id, &req.refresh_token)
            .await
    {
        warn!(user_id = %claims.user_id, error = %e, "failed to revoke refresh token");
    }
    Ok(MessageResponse::new("logged out"))
}

pub async fn register(state: &UserState, req: RegisterRequest) -> ServiceResult<UserResponse> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);

    if name.is_empty() {
        return Err(ServiceError::InvalidInput("name is required".into()));
    }
    if name.chars().count() < MIN_NAME_LEN {
        return Err(ServiceError::InvalidInput(format!(
            "name must be at least {MIN_NAME_LEN} characters"
        )));
    }
    if email.is_empty() {
        return Err(ServiceError::InvalidInput("email is required".into()));
    }
    if !is_valid_email(&email) {
        return Err(ServiceError::InvalidInput("email is invalid".into()));
    }
    if req.password.is_empty() {
        return Err(ServiceError::InvalidInput("password is required".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    match state.users.find_by_email(&email).await {
        Ok(_) => return Err(ServiceError::Conflict("email already exists".into())),
        Err(ServiceError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let password_hash = hash_password(&req.password)?;
    let user = state
        .users
        .create(NewUser {
            name,
            email,
            password_hash,
            role: Role::User,
        })
        .await?;
    info!(user_id = %user.id, "user registered");
    Ok(UserResponse::from(&user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{UserFixture, seed_user};

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    fn register_req(name: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("ab.co"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@@b.co"));
        assert!(!is_valid_email("a b@c.co"));
    }

    #[tokio::test]
    async fn login_issues_matching_pair() {
        let fx = UserFixture::new();
        let user = seed_user(&fx, "ann@example.com", "secret1", Role::Admin).await;

        let resp = login(&fx.state, login_req(" Ann@Example.com ", "secret1"))
            .await
            .unwrap();
        assert_eq!(resp.token_type, "Bearer");
        assert_eq!(resp.expires_in, 15 * 60);

        let tokens = &fx.state.tokens;
        let access = tokens.validate(&resp.access_token, TokenKind::Access).unwrap();
        let refresh = tokens.validate(&resp.refresh_token, TokenKind::Refresh).unwrap();
        for claims in [&access, &refresh] {
            assert_eq!(claims.user_id, user.id);
            assert_eq!(claims.email, "ann@example.com");
            assert_eq!(claims.role, Role::Admin);
        }
        assert!(refresh.exp > access.exp);
    }

    #[tokio::test]
    async fn login_rejects_wrong_password_and_unknown_email_alike() {
        let fx = UserFixture::new();
        seed_user(&fx, "ann@example.com", "secret1", Role::User).await;

        let wrong = login(&fx.state, login_req("ann@example.com", "nope"))
            .await
            .unwrap_err();
        let unknown = login(&fx.state, login_req("bob@example.com", "secret1"))
            .await
            .unwrap_err();
        assert_eq!(wrong, unknown);
        assert!(matches!(wrong, ServiceError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn login_validates_before_store() {
        let fx = UserFixture::new();
        let err = login(&fx.state, login_req("", "x")).await.unwrap_err();
        assert_eq!(err, ServiceError::InvalidInput("email is required".into()));
        let err = login(&fx.state, login_req("a@b.co", "")).await.unwrap_err();
        assert_eq!(err, ServiceError::InvalidInput("password is required".into()));
        assert_eq!(fx.store.calls.total(), 0);
    }

    #[tokio::test]
    async fn login_of_deleted_account_is_locked() {
        let fx = UserFixture::new();
        let user = seed_user(&fx, "ann@example.com", "secret1", Role::User).await;
        fx.state.users.soft_delete(user.id).await.unwrap();

        let err = login(&fx.state, login_req("ann@example.com", "secret1"))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Forbidden("account is locked".into()));
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_replay() {
        let fx = UserFixture::new();
        seed_user(&fx, "ann@example.com", "secret1", Role::User).await;
        let first = login(&fx.state, login_req("ann@example.com", "secret1"))
            .await
            .unwrap();

        let req = || RefreshRequest {
            refresh_token: first.refresh_token.clone(),
        };
        let second = refresh(&fx.state, req()).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        let replay = refresh(&fx.state, req()).await.unwrap_err();
        assert_eq!(
            replay,
            ServiceError::Unauthenticated("refresh token has been revoked".into())
        );

        // The rotated token still works.
        refresh(
            &fx.state,
            RefreshRequest {
                refresh_token: second.refresh_token,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn refresh_rejects_unrecorded_access_token() {
        let fx = UserFixture::new();
        seed_user(&fx, "ann@example.com", "secret1", Role::User).await;
        let pair = login(&fx.state, login_req("ann@example.com", "secret1"))
            .await
            .unwrap();

        let err = refresh(
            &fx.state,
            RefreshRequest {
                refresh_token: pair.access_token,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn refresh_rejects_garbage() {
        let fx = UserFixture::new();
        let err = refresh(
            &fx.state,
            RefreshRequest {
                refresh_token: "not-a-jwt".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Unauthenticated("invalid refresh token".into())
        );
    }

    #[tokio::test]
    async fn logout_revokes_refresh_token() {
        let fx = UserFixture::new();
        seed_user(&fx, "ann@example.com", "secret1", Role::User).await;
        let pair = login(&fx.state, login_req("ann@example.com", "secret1"))
            .await
            .unwrap();
        let req = || RefreshRequest {
            refresh_token: pair.refresh_token.clone(),
        };

        logout(&fx.state, None, req()).await.unwrap();
        // Idempotent.
        logout(&fx.state, None, req()).await.unwrap();

        let err = refresh(&fx.state, req()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn register_creates_user_role_account() {
        let fx = UserFixture::new();
        let user = register(
            &fx.state,
            register_req("Nguyen Van A", "New@Example.com", "secret1"),
        )
        .await
        .unwrap();
        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.role, Role::User);

        login(&fx.state, login_req("new@example.com", "secret1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn register_validates_fields() {
        let fx = UserFixture::new();
        let cases = [
            (register_req("", "a@b.co", "secret1"), "name is required"),
            (
                register_req("Short", "a@b.co", "secret1"),
                "name must be at least 6 characters",
            ),
            (register_req("Long enough", "", "secret1"), "email is required"),
            (register_req("Long enough", "nope", "secret1"), "email is invalid"),
            (register_req("Long enough", "a@b.co", ""), "password is required"),
            (
                register_req("Long enough", "a@b.co", "12345"),
                "password must be at least 6 characters",
            ),
        ];
        for (req, message) in cases {
            let err = register(&fx.state, req).await.unwrap_err();
            assert_eq!(err, ServiceError::InvalidInput(message.into()));
        }
        assert_eq!(fx.store.calls.total(), 0);
    }

    #[tokio::test]
    async fn register_conflicts_on_existing_email_even_if_deleted() {
        let fx = UserFixture::new();
        let user = seed_user(&fx, "ann@example.com", "secret1", Role::User).await;
        fx.state.users.soft_delete(user.id).await.unwrap();

        let err = register(
            &fx.state,
            register_req("Another Ann", "ann@example.com", "secret1"),
        )
        .await
        .unwrap_err();
        assert_eq!(err, ServiceError::Conflict("email already exists".into()));
    }
}
