//! Request middleware shared by both services.

pub mod auth;
pub mod deadline;
pub mod remote_auth;

use std::any::Any;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::error::AppError;

/// Token from `Authorization: Bearer <token>`.
///
/// The header must be exactly two space-separated parts, the first the
/// literal `Bearer`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

pub(crate) fn missing_token() -> AppError {
    AppError::Unauthorized("missing or malformed authorization header".into())
}

/// `CatchPanicLayer` handler: a panicking handler becomes a generic 500.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(%detail, "handler panicked");
    AppError::Internal(detail.to_string()).into_response()
}
