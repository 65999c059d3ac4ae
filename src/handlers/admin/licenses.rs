use axum::extract::State;
use chrono::Utc;
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::models::{Download, LicenseFilter, LicenseStatus, LicenseWithDetails};
use crate::pagination::{Paginated, PaginationQuery};

#[derive(Debug, Serialize)]
pub struct LicenseDetail {
    #[serde(flatten)]
    pub license: LicenseWithDetails,
    pub hardware_bound: bool,
}

impl From<LicenseWithDetails> for LicenseDetail {
    fn from(license: LicenseWithDetails) -> Self {
        Self {
            hardware_bound: license.license.is_hardware_bound(),
            license,
        }
    }
}

/// GET /admin/licenses?status=&user_id=&product_id=&order_id=
pub async fn list_licenses(
    State(state): State<AppState>,
    Query(filter): Query<LicenseFilter>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<LicenseDetail>>> {
    let limit = page.limit();
    let offset = page.offset();
    let conn = state.db.get()?;
    let (items, total) = queries::list_licenses_paginated(&conn, &filter, limit, offset)?;
    let items = items.into_iter().map(LicenseDetail::from).collect();
    Ok(Json(Paginated::new(items, total, limit, offset)))
}

/// GET /admin/licenses/{id}
pub async fn get_license(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LicenseDetail>> {
    let conn = state.db.get()?;
    let license = queries::get_license_with_details(&conn, &id)?.or_not_found(msg::LICENSE_NOT_FOUND)?;
    Ok(Json(license.into()))
}

/// POST /admin/licenses/{id}/revoke
///
/// ACTIVE or EXPIRED become REVOKED. Revocation is terminal, so a second call is a 409.
pub async fn revoke_license(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LicenseDetail>> {
    let conn = state.db.get()?;
    let existing = queries::get_license_by_id(&conn, &id)?.or_not_found(msg::LICENSE_NOT_FOUND)?;

    if !queries::revoke_license(&conn, &existing.id, Utc::now().timestamp())? {
        return Err(AppError::Conflict(msg::LICENSE_ALREADY_REVOKED.into()));
    }
    tracing::info!(
        license_id = %existing.id,
        previous_status = existing.status.as_ref(),
        "License revoked"
    );

    let license = queries::get_license_with_details(&conn, &id)?.or_not_found(msg::LICENSE_NOT_FOUND)?;
    Ok(Json(license.into()))
}

/// POST /admin/licenses/{id}/release-hardware
///
/// Clears the pinned fingerprint so the next validation binds the new machine.
/// Releasing an unbound license is a no-op.
pub async fn release_hardware(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LicenseDetail>> {
    let conn = state.db.get()?;
    let existing = queries::get_license_by_id(&conn, &id)?.or_not_found(msg::LICENSE_NOT_FOUND)?;
    if existing.status == LicenseStatus::Revoked {
        return Err(AppError::Conflict(msg::LICENSE_REVOKED.into()));
    }

    if queries::release_hardware(&conn, &existing.id)? {
        tracing::info!(license_id = %existing.id, "Hardware binding released");
    }

    let license = queries::get_license_with_details(&conn, &id)?.or_not_found(msg::LICENSE_NOT_FOUND)?;
    Ok(Json(license.into()))
}

/// GET /admin/licenses/{id}/downloads
pub async fn list_license_downloads(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Download>>> {
    let conn = state.db.get()?;
    queries::get_license_by_id(&conn, &id)?.or_not_found(msg::LICENSE_NOT_FOUND)?;
    Ok(Json(queries::list_downloads_for_license(&conn, &id)?))
}
