//! Liveness endpoint.

use axum::Json;

use crate::models::HealthResponse;

fn healthy(service: &str) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        service: service.into(),
    })
}

/// `GET /health` on the user service.
pub async fn user_health() -> Json<HealthResponse> {
    healthy("user-service")
}

/// `GET /health` on the catalog service.
pub async fn catalog_health() -> Json<HealthResponse> {
    healthy("product-service")
}
