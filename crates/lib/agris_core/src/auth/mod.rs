//! Token issuance/validation and password hashing.

pub mod jwt;
pub mod password;

use thiserror::Error;

pub use jwt::TokenManager;

/// Token validation failures.
///
/// `Expired` means the signature checked out but `exp` is in the past;
/// everything else that fails validation is `Invalid`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token is invalid")]
    Invalid,

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Password hashing failures.
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("bcrypt: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}
