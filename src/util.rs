use axum::http::HeaderMap;

use crate::crypto;
use crate::error::{AppError, Result};

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests, first hop only), then
/// `x-real-ip`, and extracts the `user-agent` header for the download log.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Require `Authorization: Bearer <expected>`. An unconfigured secret rejects everything.
pub fn require_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<()> {
    let token = extract_bearer_token(headers).ok_or(AppError::Unauthorized)?;
    if crypto::secret_matches(expected, token) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}
