//! The license subsystem: minting licenses for paid orders, answering
//! "is this key usable right now", and the scheduled lifecycle sweep.
//!
//! All state lives in the `licenses` table. Every mutation made here is a single
//! conditional statement (`... WHERE status = 'active'`, `... WHERE
//! hardware_fingerprint IS NULL`), so concurrent validators and sweeps never
//! need in-process locking.

mod issuer;
mod sweeper;
mod validator;

pub use issuer::{Issuance, IssuedNotice, MAX_KEY_ATTEMPTS, issue_licenses_for_order};
pub use sweeper::{
    DELIVERY_CONCURRENCY, SweepReport, URGENT_WINDOW_SECS, WARNING_WINDOW_SECS, run_sweep,
    run_sweep_and_deliver,
};
pub use validator::validate_license;

use serde::Serialize;

use crate::crypto;
use crate::models::{License, Product, User};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Expiry for a license minted at `issued_at` for a product with the given duration.
/// None means perpetual.
pub fn compute_expires_at(issued_at: i64, duration_days: Option<i32>) -> Option<i64> {
    duration_days.map(|days| issued_at + i64::from(days) * SECONDS_PER_DAY)
}

/// Source of candidate license keys. Production draws from the OS RNG; tests
/// inject fixed sequences to force collisions.
pub trait KeySource: Send {
    fn next_key(&mut self) -> String;
}

/// Keys from `crypto::generate_license_key`.
#[derive(Debug, Clone)]
pub struct RandomKeySource {
    prefix: String,
}

impl RandomKeySource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl KeySource for RandomKeySource {
    fn next_key(&mut self) -> String {
        crypto::generate_license_key(&self.prefix)
    }
}

/// How strictly hardware binding is enforced when the client presents no
/// hardware info for a license that requires binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationPolicy {
    /// false: key-only check succeeds. true: fail with `HardwareRequired`.
    pub require_fingerprint: bool,
}

/// Why a key is not usable. These are results, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    NotFound,
    Revoked,
    Expired,
    ProductMismatch,
    HardwareMismatch,
    HardwareRequired,
}

impl InvalidReason {
    pub fn code(&self) -> &'static str {
        match self {
            InvalidReason::NotFound => "not_found",
            InvalidReason::Revoked => "revoked",
            InvalidReason::Expired => "expired",
            InvalidReason::ProductMismatch => "product_mismatch",
            InvalidReason::HardwareMismatch => "hardware_mismatch",
            InvalidReason::HardwareRequired => "hardware_required",
        }
    }

    /// Human-readable reason shown to end users.
    pub fn message(&self) -> &'static str {
        match self {
            InvalidReason::NotFound => "License not found",
            InvalidReason::Revoked => "License has been revoked",
            InvalidReason::Expired => "License has expired",
            InvalidReason::ProductMismatch => "License is for the wrong product",
            InvalidReason::HardwareMismatch => "License is bound to different hardware (hardware mismatch)",
            InvalidReason::HardwareRequired => "Hardware info is required for this license",
        }
    }
}

/// A usable license with the product and owner it belongs to.
#[derive(Debug, Clone)]
pub struct ValidLicense {
    pub license: License,
    pub product: Product,
    pub user: User,
    /// True when this validation pinned the license to the presented hardware.
    pub newly_bound: bool,
}

#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Valid(Box<ValidLicense>),
    Invalid(InvalidReason),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            ValidationOutcome::Valid(_) => None,
            ValidationOutcome::Invalid(reason) => Some(*reason),
        }
    }
}
