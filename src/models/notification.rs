use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    LicenseIssued,
    /// Expires within seven days
    LicenseExpiring,
    /// Expires within one day
    LicenseExpiringUrgent,
}

/// In-app notification shown in the customer's inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub license_id: Option<String>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub user_id: String,
    pub license_id: Option<String>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Rows sharing a dedupe key are recorded once; later inserts are ignored.
    pub dedupe_key: Option<String>,
}
