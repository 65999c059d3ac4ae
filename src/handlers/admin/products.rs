use axum::{extract::State, http::StatusCode};
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::models::{CreateProduct, Product, UpdateProduct};
use crate::pagination::{Paginated, PaginationQuery};

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// POST /admin/products
pub async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<CreateProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    input.validate()?;
    let conn = state.db.get()?;
    let product = queries::create_product(&conn, &input)?;
    tracing::info!(product_id = %product.id, slug = %product.slug, "Created product");
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /admin/products
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<Product>>> {
    let limit = page.limit();
    let offset = page.offset();
    let conn = state.db.get()?;
    let (items, total) =
        queries::list_products_paginated(&conn, query.include_inactive, limit, offset)?;
    Ok(Json(Paginated::new(items, total, limit, offset)))
}

/// GET /admin/products/{id}
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>> {
    let conn = state.db.get()?;
    let product = queries::get_product_by_id(&conn, &id)?.or_not_found(msg::PRODUCT_NOT_FOUND)?;
    Ok(Json(product))
}

/// PUT /admin/products/{id}
///
/// Duration and binding changes apply to licenses minted afterwards; existing
/// licenses keep their expiry.
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateProduct>,
) -> Result<Json<Product>> {
    input.validate()?;
    let conn = state.db.get()?;
    queries::get_product_by_id(&conn, &id)?.or_not_found(msg::PRODUCT_NOT_FOUND)?;
    let product = queries::update_product(&conn, &id, &input)?.or_not_found(msg::PRODUCT_NOT_FOUND)?;
    tracing::info!(product_id = %product.id, "Updated product");
    Ok(Json(product))
}
