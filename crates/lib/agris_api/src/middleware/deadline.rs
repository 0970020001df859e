//! Per-request deadline.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::AppError;

/// Aborts the handler once `budget` has elapsed. Whatever store or cache
/// call was in flight is dropped; the caller gets a 500.
pub async fn deadline(
    State(budget): State<Duration>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    match tokio::time::timeout(budget, next.run(request)).await {
        Ok(response) => Ok(response),
        Err(_) => {
            warn!(%method, %path, budget_ms = budget.as_millis() as u64, "request deadline exceeded");
            Err(AppError::Internal("request deadline exceeded".into()))
        }
    }
}
