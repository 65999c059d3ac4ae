use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::licensing::{self, ValidationOutcome};
use crate::models::LicenseStatus;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub license_key: String,
    #[serde(default)]
    pub product_id: Option<String>,
    /// Free-form machine description; objects and strings are both accepted.
    #[serde(default)]
    pub hardware_info: Option<Value>,
}

/// License summary for the full validation response. No user id, no fingerprint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSummary {
    pub id: String,
    pub license_key: String,
    pub status: LicenseStatus,
    pub expires_at: Option<i64>,
    pub product_id: String,
    pub product_name: String,
    pub user_name: String,
    pub requires_hardware_binding: bool,
    pub hardware_bound: bool,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<LicenseSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    /// Machine-readable reason code (`expired`, `product_mismatch`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// POST /licenses/validate
pub async fn validate_license(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>> {
    let conn = state.db.get()?;
    let outcome = licensing::validate_license(
        &conn,
        &req.license_key,
        req.product_id.as_deref(),
        req.hardware_info.as_ref(),
        state.validation_policy,
        Utc::now().timestamp(),
    )?;

    let response = match outcome {
        ValidationOutcome::Valid(valid) => ValidateResponse {
            valid: true,
            license: Some(LicenseSummary {
                hardware_bound: valid.license.is_hardware_bound(),
                id: valid.license.id,
                license_key: valid.license.license_key,
                status: valid.license.status,
                expires_at: valid.license.expires_at,
                product_id: valid.license.product_id,
                product_name: valid.product.name,
                user_name: valid.user.name,
                requires_hardware_binding: valid.license.requires_hardware_binding,
            }),
            error: None,
            reason: None,
        },
        ValidationOutcome::Invalid(reason) => ValidateResponse {
            valid: false,
            license: None,
            error: Some(reason.message()),
            reason: Some(reason.code()),
        },
    };

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateQuery {
    pub key: String,
    #[serde(default)]
    pub product_id: Option<String>,
}

/// Reduced projection for the key-in-URL check: never echoes the key or user id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseProjection {
    pub product_name: String,
    pub user_name: String,
    pub expires_at: Option<i64>,
    pub status: LicenseStatus,
}

#[derive(Debug, Serialize)]
pub struct ValidateQueryResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<LicenseProjection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// GET /licenses/validate?key=&productId=
///
/// Simple key check without hardware info, so hardware-bound licenses are
/// never pinned from here.
pub async fn check_license(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Result<Json<ValidateQueryResponse>> {
    let conn = state.db.get()?;
    let outcome = licensing::validate_license(
        &conn,
        &query.key,
        query.product_id.as_deref(),
        None,
        state.validation_policy,
        Utc::now().timestamp(),
    )?;

    let response = match outcome {
        ValidationOutcome::Valid(valid) => ValidateQueryResponse {
            valid: true,
            license: Some(LicenseProjection {
                product_name: valid.product.name,
                user_name: valid.user.name,
                expires_at: valid.license.expires_at,
                status: valid.license.status,
            }),
            error: None,
        },
        ValidationOutcome::Invalid(reason) => ValidateQueryResponse {
            valid: false,
            license: None,
            error: Some(reason.message()),
        },
    };

    Ok(Json(response))
}
