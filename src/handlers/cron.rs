use axum::{Router, extract::State, http::HeaderMap, routing::get};
use chrono::Utc;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::licensing::{self, SweepReport};
use crate::util::require_bearer;

pub fn router() -> Router<AppState> {
    Router::new().route("/cron/license-sweep", get(license_sweep).post(license_sweep))
}

/// GET|POST /cron/license-sweep
///
/// Authorized by `Authorization: Bearer <CRON_SECRET>` before any work starts.
pub async fn license_sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepReport>> {
    if let Err(e) = require_bearer(&headers, state.cron_secret.as_deref()) {
        tracing::warn!("Rejected license sweep trigger");
        return Err(e);
    }

    let report = licensing::run_sweep(&state, Utc::now().timestamp())?;
    Ok(Json(report))
}
