//! Service error taxonomy shared by repositories and services.

use http::StatusCode;
use thiserror::Error;
use tracing::error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Every failure a repository or service can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found() -> Self {
        Self::NotFound("not found".into())
    }

    pub fn unauthenticated() -> Self {
        Self::Unauthenticated("unauthorized".into())
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("forbidden".into())
    }

    pub fn internal() -> Self {
        Self::Internal("internal server error".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(m)
            | Self::InvalidInput(m)
            | Self::Unauthenticated(m)
            | Self::Forbidden(m)
            | Self::Conflict(m)
            | Self::Internal(m) => m,
        }
    }
}

/// Postgres unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::not_found(),
            sqlx::Error::Database(ref db)
                if db.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Self::Conflict("resource already exists".into())
            }
            other => {
                error!(error = %other, "database error");
                Self::internal()
            }
        }
    }
}

impl From<crate::auth::PasswordError> for ServiceError {
    fn from(e: crate::auth::PasswordError) -> Self {
        error!(error = %e, "password hashing failed");
        Self::internal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_covers_every_kind() {
        let cases = [
            (ServiceError::not_found(), 404),
            (ServiceError::InvalidInput("x".into()), 400),
            (ServiceError::unauthenticated(), 401),
            (ServiceError::forbidden(), 403),
            (ServiceError::Conflict("x".into()), 409),
            (ServiceError::internal(), 500),
        ];
        for (err, code) in cases {
            assert_eq!(err.status().as_u16(), code, "{}", err.kind());
        }
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: ServiceError = sqlx::Error::RowNotFound.into();
        assert_eq!(err, ServiceError::not_found());
    }

    #[test]
    fn other_sqlx_errors_are_internal_and_generic() {
        let err: ServiceError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "internal server error");
    }
}
