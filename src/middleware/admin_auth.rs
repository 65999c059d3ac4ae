use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::db::AppState;
use crate::error::AppError;
use crate::util::require_bearer;

/// Gate for the admin API: `Authorization: Bearer <ADMIN_API_KEY>`.
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Err(e) = require_bearer(request.headers(), state.admin_api_key.as_deref()) {
        tracing::debug!(path = %request.uri().path(), "Rejected admin request");
        return Err(e);
    }
    Ok(next.run(request).await)
}
