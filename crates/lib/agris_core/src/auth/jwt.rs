//! JWT token generation and verification.

use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use super::TokenError;
use crate::config::JwtSettings;
use crate::models::auth::{Claims, IssuedToken, TokenKind, TokenSubject};

/// The only accepted signing algorithm.
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Issues and validates HS256 tokens for one secret and issuer.
#[derive(Clone)]
pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(settings: &JwtSettings) -> Self {
        let secret = settings.secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: settings.issuer.clone(),
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue a token with the configured lifetime for `kind`.
    pub fn issue(&self, subject: &TokenSubject, kind: TokenKind) -> Result<IssuedToken, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        self.issue_with_ttl(subject, kind, ttl)
    }

    /// Issue a `kind` token valid from now until `now + ttl`.
    pub fn issue_with_ttl(
        &self,
        subject: &TokenSubject,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let token_id = Uuid::new_v4();
        let claims = Claims {
            user_id: subject.user_id,
            email: subject.email.clone(),
            role: subject.role,
            jti: token_id,
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            sub: subject.user_id.to_string(),
            typ: kind,
        };
        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(format!("jwt encode: {e}")))?;
        Ok(IssuedToken {
            token,
            token_id,
            expires_at,
        })
    }

    /// Verify signature, algorithm, issuer, time bounds and that the token
    /// is of the `expected` kind.
    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;
        if claims.typ != expected {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::Role;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn manager(secret: &str) -> TokenManager {
        TokenManager::new(&JwtSettings::new(secret))
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: Uuid::new_v4(),
            email: "alice@example.com".into(),
            role: Role::Admin,
        }
    }

    #[test]
    fn issued_token_validates_with_same_identity() {
        let tm = manager(SECRET);
        let who = subject();
        let issued = tm.issue(&who, TokenKind::Access).unwrap();
        let claims = tm.validate(&issued.token, TokenKind::Access).unwrap();
        assert_eq!(claims.subject(), who);
        assert_eq!(claims.typ, TokenKind::Access);
        assert_eq!(claims.sub, who.user_id.to_string());
        assert_eq!(claims.jti, issued.token_id);
        assert_eq!(claims.iss, "user-service");
        assert_eq!(claims.exp, issued.expires_at.timestamp());
        assert_eq!(claims.nbf, claims.iat);
    }

    #[test]
    fn refresh_token_outlives_access_token() {
        let tm = manager(SECRET);
        let who = subject();
        let access = tm.issue(&who, TokenKind::Access).unwrap();
        let refresh = tm.issue(&who, TokenKind::Refresh).unwrap();
        assert!(refresh.expires_at > access.expires_at);
        assert_eq!(
            tm.validate(&refresh.token, TokenKind::Refresh).unwrap().subject(),
            who
        );
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let tm = manager(SECRET);
        let who = subject();
        let access = tm.issue(&who, TokenKind::Access).unwrap();
        let refresh = tm.issue(&who, TokenKind::Refresh).unwrap();
        assert_eq!(
            tm.validate(&refresh.token, TokenKind::Access),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            tm.validate(&access.token, TokenKind::Refresh),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn every_issuance_gets_a_fresh_token_id() {
        let tm = manager(SECRET);
        let who = subject();
        let a = tm.issue(&who, TokenKind::Access).unwrap();
        let b = tm.issue(&who, TokenKind::Access).unwrap();
        assert_ne!(a.token_id, b.token_id);
    }

    #[test]
    fn expired_token_reports_expired() {
        let tm = manager(SECRET);
        let issued = tm
            .issue_with_ttl(&subject(), TokenKind::Access, Duration::seconds(-60))
            .unwrap();
        assert_eq!(tm.validate(&issued.token, TokenKind::Access), Err(TokenError::Expired));
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let issued = manager(SECRET).issue(&subject(), TokenKind::Access).unwrap();
        let other = manager("fedcba9876543210fedcba9876543210");
        assert_eq!(other.validate(&issued.token, TokenKind::Access), Err(TokenError::Invalid));
    }

    #[test]
    fn expired_token_with_wrong_secret_is_invalid() {
        let issued = manager(SECRET)
            .issue_with_ttl(&subject(), TokenKind::Access, Duration::seconds(-60))
            .unwrap();
        let other = manager("fedcba9876543210fedcba9876543210");
        assert_eq!(other.validate(&issued.token, TokenKind::Access), Err(TokenError::Invalid));
    }

    #[test]
    fn tampered_payload_is_invalid() {
        let tm = manager(SECRET);
        let issued = tm.issue(&subject(), TokenKind::Access).unwrap();
        let forged = tm.issue(&subject(), TokenKind::Access).unwrap();
        let forged_payload = forged.token.split('.').nth(1).unwrap();
        let mut parts: Vec<&str> = issued.token.split('.').collect();
        parts[1] = forged_payload;
        assert_eq!(tm.validate(&parts.join("."), TokenKind::Access), Err(TokenError::Invalid));
    }

    #[test]
    fn other_hmac_algorithm_is_rejected() {
        let tm = manager(SECRET);
        let who = subject();
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id: who.user_id,
            email: who.email.clone(),
            role: who.role,
            jti: Uuid::new_v4(),
            iat: now,
            nbf: now,
            exp: now + 600,
            iss: "user-service".into(),
            sub: who.user_id.to_string(),
            typ: TokenKind::Access,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(tm.validate(&token, TokenKind::Access), Err(TokenError::Invalid));
    }

    #[test]
    fn foreign_issuer_is_invalid() {
        let mut settings = JwtSettings::new(SECRET);
        settings.issuer = "someone-else".into();
        let issued = TokenManager::new(&settings)
            .issue(&subject(), TokenKind::Access)
            .unwrap();
        assert_eq!(
            manager(SECRET).validate(&issued.token, TokenKind::Access),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn garbage_is_invalid() {
        let tm = manager(SECRET);
        assert_eq!(tm.validate("", TokenKind::Access), Err(TokenError::Invalid));
        assert_eq!(tm.validate("not.a.jwt", TokenKind::Access), Err(TokenError::Invalid));
    }

    #[test]
    fn debug_does_not_print_keys() {
        let dbg = format!("{:?}", manager(SECRET));
        assert!(dbg.contains("user-service"));
        assert!(!dbg.contains(SECRET));
    }
}
