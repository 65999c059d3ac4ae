use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// User-facing messages shared between handlers and tests.
pub mod msg {
    pub const PRODUCT_NOT_FOUND: &str = "Product not found";
    pub const ORDER_NOT_FOUND: &str = "Order not found";
    pub const LICENSE_NOT_FOUND: &str = "License not found";
    pub const USER_NOT_FOUND: &str = "User not found";
    pub const NOTIFICATION_NOT_FOUND: &str = "Notification not found";
    pub const PRODUCT_INACTIVE: &str = "Product is not available for purchase";
    pub const CART_EMPTY: &str = "Cart must contain at least one item";
    pub const INVALID_QUANTITY: &str = "Quantity must be between 1 and 100";
    pub const MIXED_CURRENCIES: &str = "All items in an order must share one currency";
    pub const EMAIL_INVALID: &str = "A valid email address is required";
    pub const NAME_EMPTY: &str = "Name cannot be empty";
    pub const SLUG_INVALID: &str = "Slug must be lowercase letters, digits and dashes";
    pub const PRICE_NEGATIVE: &str = "Price cannot be negative";
    pub const DURATION_INVALID: &str = "Duration must be at least one day";
    pub const AMOUNT_MISMATCH: &str = "Paid amount does not match the order total";
    pub const ORDER_ALREADY_ISSUED: &str = "Licenses have already been issued for this order";
    pub const LICENSE_ALREADY_REVOKED: &str = "License is already revoked";
    pub const LICENSE_REVOKED: &str = "License is revoked";
    pub const INVALID_SIGNATURE: &str = "Invalid signature";
    pub const MALFORMED_BODY: &str = "Request body is not valid JSON of the expected shape";
    pub const NO_DOWNLOAD: &str = "This product has no download";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("{0}")]
    Conflict(String),

    /// Every draw for one unit collided with an existing key.
    #[error("license key generation failed: {0}")]
    KeyGeneration(String),

    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    /// Malformed request payload parsed outside an extractor (raw callback bodies).
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("notification delivery: {0}")]
    Notification(#[from] reqwest::Error),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_) => {
                tracing::debug!(error = %rejection.body_text(), "Rejected malformed payload");
                AppError::BadRequest(msg::MALFORMED_BODY.into())
            }
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::KeyGeneration(_)
            | AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Notification(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::NotFound(msg) => ErrorBody {
                error: "Not found",
                details: Some(msg.clone()),
            },
            AppError::BadRequest(msg) => ErrorBody {
                error: "Bad request",
                details: Some(msg.clone()),
            },
            AppError::Json(e) => {
                tracing::debug!(error = %e, "Rejected malformed payload");
                ErrorBody {
                    error: "Invalid JSON",
                    details: Some(msg::MALFORMED_BODY.into()),
                }
            }
            AppError::Unauthorized => ErrorBody {
                error: "Unauthorized",
                details: None,
            },
            AppError::Conflict(msg) => ErrorBody {
                error: "Conflict",
                details: Some(msg.clone()),
            },
            // Server-side failures are logged in full and never echoed to the caller
            _ => {
                tracing::error!(error = %self, "Request failed");
                ErrorBody {
                    error: "Internal server error",
                    details: None,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Converts `Option<T>` lookups into 404s.
pub trait OptionExt<T> {
    fn or_not_found(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, message: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(message.to_string()))
    }
}
