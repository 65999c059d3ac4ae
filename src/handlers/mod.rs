pub mod admin;
pub mod cron;
pub mod payments;
pub mod public;

use axum::Router;

use crate::db::AppState;

/// Every HTTP surface merged and bound to `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Public endpoints (no auth)
        .merge(public::router())
        // Payment gateway (HMAC-signed body)
        .merge(payments::router())
        // Scheduler trigger (CRON_SECRET bearer)
        .merge(cron::router())
        // Back office (ADMIN_API_KEY bearer)
        .merge(admin::router(state.clone()))
        .with_state(state)
}
