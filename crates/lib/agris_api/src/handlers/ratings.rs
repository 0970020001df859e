//! Rating request handlers.

use agris_core::models::auth::Principal;
use agris_core::models::catalog::{MyRatings, Rating, RatingQuery, RatingStatistics};
use agris_core::models::page::Page;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use uuid::Uuid;

use crate::CatalogState;
use crate::error::AppResult;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::models::MessageResponse;
use crate::models::catalog::{MyRatingsParams, RateRequest, RatingListParams, RatingResponse};
use crate::services::ratings;

/// `GET /products/ratings/{productId}`
pub async fn list_handler(
    State(state): State<CatalogState>,
    AppPath(product_id): AppPath<Uuid>,
    AppQuery(params): AppQuery<RatingListParams>,
) -> AppResult<Json<Page<Rating, RatingQuery>>> {
    Ok(Json(
        ratings::list_for_product(&state, product_id, &params).await?,
    ))
}

/// `GET /products/ratings/statistic/{productId}`
pub async fn statistics_handler(
    State(state): State<CatalogState>,
    AppPath(product_id): AppPath<Uuid>,
) -> AppResult<Json<RatingStatistics>> {
    Ok(Json(ratings::statistics(&state, product_id).await?))
}

/// `POST /products/{productId}/ratings`: rate a product once.
pub async fn create_handler(
    State(state): State<CatalogState>,
    Extension(principal): Extension<Principal>,
    AppPath(product_id): AppPath<Uuid>,
    AppJson(body): AppJson<RateRequest>,
) -> AppResult<(StatusCode, Json<RatingResponse>)> {
    let rating = ratings::rate_product(&state, &principal, product_id, body).await?;
    Ok((StatusCode::CREATED, Json(rating)))
}

/// `PUT /products/ratings/{ratingId}`: author only.
pub async fn update_handler(
    State(state): State<CatalogState>,
    Extension(principal): Extension<Principal>,
    AppPath(rating_id): AppPath<Uuid>,
    AppJson(body): AppJson<RateRequest>,
) -> AppResult<Json<RatingResponse>> {
    Ok(Json(
        ratings::update_rating(&state, &principal, rating_id, body).await?,
    ))
}

/// `DELETE /products/ratings/{ratingId}`: author only.
pub async fn delete_handler(
    State(state): State<CatalogState>,
    Extension(principal): Extension<Principal>,
    AppPath(rating_id): AppPath<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(
        ratings::delete_rating(&state, &principal, rating_id).await?,
    ))
}

/// `GET /ratings/me`
pub async fn my_ratings_handler(
    State(state): State<CatalogState>,
    Extension(principal): Extension<Principal>,
    AppQuery(params): AppQuery<MyRatingsParams>,
) -> AppResult<Json<MyRatings>> {
    Ok(Json(ratings::my_ratings(&state, &principal, &params).await?))
}
