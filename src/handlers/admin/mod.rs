mod licenses;
mod notifications;
mod orders;
mod products;

pub use licenses::*;
pub use notifications::*;
pub use orders::*;
pub use products::*;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::db::AppState;
use crate::middleware::admin_auth;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // Catalog
        .route("/admin/products", post(create_product).get(list_products))
        .route("/admin/products/{id}", get(get_product).put(update_product))
        // Orders
        .route("/admin/orders", get(list_orders))
        .route("/admin/orders/{id}", get(get_order))
        // Licenses
        .route("/admin/licenses", get(list_licenses))
        .route("/admin/licenses/{id}", get(get_license))
        .route("/admin/licenses/{id}/revoke", post(revoke_license))
        .route("/admin/licenses/{id}/release-hardware", post(release_hardware))
        .route("/admin/licenses/{id}/downloads", get(list_license_downloads))
        // Customer inbox (session auth lives in front of this service)
        .route("/users/{user_id}/notifications", get(list_notifications))
        .route("/users/{user_id}/notifications/{id}/read", post(mark_notification_read))
        .layer(middleware::from_fn_with_state(state, admin_auth))
}
