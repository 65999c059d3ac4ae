use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result, msg};

/// Upper bound on units per cart line; every unit becomes its own license row.
pub const MAX_ITEM_QUANTITY: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub currency: String,
    /// Gateway transaction id, recorded when the callback arrives
    pub payment_reference: Option<String>,
    pub created_at: i64,
    pub paid_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i32,
    /// Price snapshot at checkout time
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub quantity: i32,
}

impl CartItem {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ITEM_QUANTITY).contains(&self.quantity) {
            return Err(AppError::BadRequest(msg::INVALID_QUANTITY.into()));
        }
        Ok(())
    }
}

/// Resolved order line handed to `create_order` (product looked up, price fixed).
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}
