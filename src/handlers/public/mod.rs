mod checkout;
mod downloads;
mod validate;

pub use checkout::*;
pub use downloads::*;
pub use validate::*;

use axum::{
    Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;
use crate::extractors::Json;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/licenses/validate", post(validate_license).get(check_license))
        .route("/checkout", post(checkout))
        .route("/downloads/authorize", post(authorize_download))
}
