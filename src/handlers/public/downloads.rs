use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{ClientInfo, Json};
use crate::licensing::{self, ValidationOutcome};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeDownloadRequest {
    pub license_key: String,
    pub product_id: String,
    #[serde(default)]
    pub hardware_info: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeDownloadResponse {
    pub download_url: String,
    pub product_name: String,
}

#[derive(Debug, Serialize)]
struct DownloadDenied {
    valid: bool,
    error: &'static str,
}

/// POST /downloads/authorize
///
/// Same checks as validation; only a successful check is logged to `downloads`.
pub async fn authorize_download(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<AuthorizeDownloadRequest>,
) -> Result<Response> {
    let conn = state.db.get()?;
    let outcome = licensing::validate_license(
        &conn,
        &req.license_key,
        Some(&req.product_id),
        req.hardware_info.as_ref(),
        state.validation_policy,
        Utc::now().timestamp(),
    )?;

    let valid = match outcome {
        ValidationOutcome::Valid(valid) => valid,
        ValidationOutcome::Invalid(reason) => {
            let denied = DownloadDenied {
                valid: false,
                error: reason.message(),
            };
            return Ok((StatusCode::FORBIDDEN, Json(denied)).into_response());
        }
    };

    let download_url = valid
        .product
        .download_url
        .clone()
        .ok_or_else(|| AppError::NotFound(msg::NO_DOWNLOAD.into()))?;

    queries::record_download(
        &conn,
        &valid.license.id,
        &valid.license.user_id,
        client.ip_address.as_deref(),
        client.user_agent.as_deref(),
    )?;

    tracing::info!(
        license_id = %valid.license.id,
        product_id = %valid.product.id,
        ip = ?client.ip_address,
        "Download authorized"
    );

    Ok(Json(AuthorizeDownloadResponse {
        download_url,
        product_name: valid.product.name.clone(),
    })
    .into_response())
}
