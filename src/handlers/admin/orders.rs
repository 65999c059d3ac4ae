use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::models::{License, Order, OrderStatus, OrderWithItems};
use crate::pagination::{Paginated, PaginationQuery};

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderWithItems,
    pub licenses: Vec<License>,
}

/// GET /admin/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<Order>>> {
    let limit = page.limit();
    let offset = page.offset();
    let conn = state.db.get()?;
    let (items, total) =
        queries::list_orders_paginated(&conn, query.status, query.user_id.as_deref(), limit, offset)?;
    Ok(Json(Paginated::new(items, total, limit, offset)))
}

/// GET /admin/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetail>> {
    let conn = state.db.get()?;
    let order = queries::get_order_with_items(&conn, &id)?.or_not_found(msg::ORDER_NOT_FOUND)?;
    let licenses = queries::list_licenses_for_order(&conn, &id)?;
    Ok(Json(OrderDetail { order, licenses }))
}
