use rusqlite::Connection;
use serde_json::Value;

use super::{InvalidReason, ValidLicense, ValidationOutcome, ValidationPolicy};
use crate::crypto;
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::LicenseStatus;

/// Decide whether `license_key` is usable right now, for `product_id` (if given),
/// on the machine described by `hardware_info` (if given).
///
/// Checks run in a fixed order: existence, revocation, expiry, product,
/// hardware. An ACTIVE license found past its expiry is moved to EXPIRED here,
/// so a key never validates after its expiry even when the sweep has not run.
pub fn validate_license(
    conn: &Connection,
    license_key: &str,
    product_id: Option<&str>,
    hardware_info: Option<&Value>,
    policy: ValidationPolicy,
    now: i64,
) -> Result<ValidationOutcome> {
    let invalid = |reason: InvalidReason| Ok(ValidationOutcome::Invalid(reason));

    let Some(mut license) = queries::get_license_by_key(conn, license_key)? else {
        return invalid(InvalidReason::NotFound);
    };

    match license.status {
        LicenseStatus::Revoked => return invalid(InvalidReason::Revoked),
        LicenseStatus::Expired => return invalid(InvalidReason::Expired),
        LicenseStatus::Active => {}
    }

    if let Some(expires_at) = license.expires_at
        && expires_at < now
    {
        // Losing this race to the sweep (or another validator) is fine: the row is
        // expired either way.
        if queries::expire_license_if_due(conn, &license.id, now)? {
            tracing::info!(license_id = %license.id, expires_at, "License expired on validation");
        }
        return invalid(InvalidReason::Expired);
    }

    if let Some(product_id) = product_id
        && product_id != license.product_id
    {
        return invalid(InvalidReason::ProductMismatch);
    }

    let mut newly_bound = false;
    if license.requires_hardware_binding {
        let presented = hardware_info.and_then(crypto::hardware_fingerprint);
        match presented {
            Some(fingerprint) => {
                if queries::try_bind_hardware(conn, &license.id, &fingerprint, now)? {
                    tracing::info!(license_id = %license.id, "License bound to hardware");
                    license.hardware_fingerprint = Some(fingerprint);
                    license.hardware_bound_at = Some(now);
                    newly_bound = true;
                } else {
                    // Already bound (possibly a moment ago by a concurrent caller), or
                    // revoked/expired since the read above. Decide on what is stored now.
                    let current = queries::get_license_by_id(conn, &license.id)?.ok_or_else(|| {
                        AppError::Internal(format!("License {} vanished during validation", license.id))
                    })?;
                    match current.status {
                        LicenseStatus::Revoked => return invalid(InvalidReason::Revoked),
                        LicenseStatus::Expired => return invalid(InvalidReason::Expired),
                        LicenseStatus::Active => {}
                    }
                    if current.hardware_fingerprint.as_deref() != Some(fingerprint.as_str()) {
                        tracing::debug!(license_id = %license.id, "Hardware fingerprint mismatch");
                        return invalid(InvalidReason::HardwareMismatch);
                    }
                    license = current;
                }
            }
            None if policy.require_fingerprint => {
                return invalid(InvalidReason::HardwareRequired);
            }
            None => {}
        }
    }

    let product = queries::get_product_by_id(conn, &license.product_id)?.ok_or_else(|| {
        AppError::Internal(format!("License {} references missing product", license.id))
    })?;
    let user = queries::get_user_by_id(conn, &license.user_id)?.ok_or_else(|| {
        AppError::Internal(format!("License {} references missing user", license.id))
    })?;

    Ok(ValidationOutcome::Valid(Box::new(ValidLicense {
        license,
        product,
        user,
        newly_bound,
    })))
}
