use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::models::{CartItem, NewOrderItem, OrderStatus, validate_email_format};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub email: String,
    pub name: String,
    pub items: Vec<CartItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub currency: String,
}

/// POST /checkout
///
/// Turns a cart into a PENDING order with prices snapshotted from the catalog.
/// Licenses are only minted later, when the payment callback confirms the order.
pub async fn checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>)> {
    validate_email_format(&req.email)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(msg::NAME_EMPTY.into()));
    }
    if req.items.is_empty() {
        return Err(AppError::BadRequest(msg::CART_EMPTY.into()));
    }

    let mut conn = state.db.get()?;

    let mut currency: Option<String> = None;
    let mut lines = Vec::with_capacity(req.items.len());
    for item in &req.items {
        item.validate()?;
        let product = queries::get_product_by_id(&conn, &item.product_id)?
            .ok_or_else(|| AppError::BadRequest(msg::PRODUCT_NOT_FOUND.into()))?;
        if !product.active {
            return Err(AppError::BadRequest(msg::PRODUCT_INACTIVE.into()));
        }
        match currency {
            Some(ref c) if *c != product.currency => {
                return Err(AppError::BadRequest(msg::MIXED_CURRENCIES.into()));
            }
            Some(_) => {}
            None => currency = Some(product.currency.clone()),
        }
        lines.push(NewOrderItem {
            product_id: product.id,
            quantity: item.quantity,
            unit_price_cents: product.price_cents,
        });
    }
    let currency = currency.ok_or_else(|| AppError::BadRequest(msg::CART_EMPTY.into()))?;

    let user = queries::upsert_user_by_email(&conn, &req.email, name)?;
    let order = queries::create_order(&mut conn, &user.id, &currency, &lines)?;

    tracing::info!(
        order_id = %order.order.id,
        user_id = %user.id,
        total_cents = order.order.total_cents,
        "Created pending order"
    );

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: order.order.id,
            status: order.order.status,
            total_cents: order.order.total_cents,
            currency: order.order.currency,
        }),
    ))
}
