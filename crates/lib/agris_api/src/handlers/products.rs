//! Product request handlers.

use agris_core::models::catalog::{Product, ProductQuery, RelationKind, RelationQuery};
use agris_core::models::page::Page;
use axum::Json;
use axum::extract::State;
use uuid::Uuid;

use crate::CatalogState;
use crate::error::AppResult;
use crate::extract::{AppPath, AppQuery};
use crate::models::catalog::{PageParams, ProductListParams};
use crate::services::products;

/// `GET /products/list`
pub async fn list_handler(
    State(state): State<CatalogState>,
    AppQuery(params): AppQuery<ProductListParams>,
) -> AppResult<Json<Page<Product, ProductQuery>>> {
    Ok(Json(products::list(&state, &params).await?))
}

/// `GET /products/product/{id}`
pub async fn get_handler(
    State(state): State<CatalogState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Product>> {
    Ok(Json(products::get(&state, id).await?))
}

/// `GET /products/product/{id}/similar`
pub async fn similar_handler(
    State(state): State<CatalogState>,
    AppPath(id): AppPath<Uuid>,
    AppQuery(params): AppQuery<PageParams>,
) -> AppResult<Json<Page<Product, RelationQuery>>> {
    let page = products::relations(&state, id, RelationKind::Similar, params).await?;
    Ok(Json(page))
}

/// `GET /products/product/{id}/related`
pub async fn related_handler(
    State(state): State<CatalogState>,
    AppPath(id): AppPath<Uuid>,
    AppQuery(params): AppQuery<PageParams>,
) -> AppResult<Json<Page<Product, RelationQuery>>> {
    let page = products::relations(&state, id, RelationKind::Related, params).await?;
    Ok(Json(page))
}
