use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// License state. ACTIVE may become EXPIRED (automatically) or REVOKED (by an admin);
/// EXPIRED may become REVOKED; REVOKED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    pub license_key: String,
    pub user_id: String,
    pub product_id: String,
    /// Order that paid for this license (None for admin grants)
    pub order_id: Option<String>,
    pub order_item_id: Option<String>,
    pub status: LicenseStatus,
    /// Set once at issuance and never changed. None = perpetual.
    pub expires_at: Option<i64>,
    pub requires_hardware_binding: bool,
    /// SHA-256 of the canonical hardware info presented at first successful validation
    #[serde(skip_serializing)]
    pub hardware_fingerprint: Option<String>,
    pub hardware_bound_at: Option<i64>,
    pub revoked_at: Option<i64>,
    pub created_at: i64,
}

impl License {
    pub fn is_hardware_bound(&self) -> bool {
        self.hardware_fingerprint.is_some()
    }
}

/// Everything needed to mint one license row.
#[derive(Debug, Clone)]
pub struct CreateLicense {
    pub license_key: String,
    pub user_id: String,
    pub product_id: String,
    pub order_id: Option<String>,
    pub order_item_id: Option<String>,
    pub expires_at: Option<i64>,
    pub requires_hardware_binding: bool,
}

/// License joined with the display names admins and customers need.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseWithDetails {
    #[serde(flatten)]
    pub license: License,
    pub product_name: String,
    pub user_name: String,
    pub user_email: String,
}

/// Filters for the admin license listing.
#[derive(Debug, Default, Deserialize)]
pub struct LicenseFilter {
    pub status: Option<LicenseStatus>,
    pub user_id: Option<String>,
    pub product_id: Option<String>,
    pub order_id: Option<String>,
}
