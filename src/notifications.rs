//! Outbound delivery of customer notifications.
//!
//! Every notification is first recorded in-app (the `notifications` table); this
//! service then pushes a copy out of band. Supports three modes:
//! 1. Send email via the Resend API (when `RESEND_API_KEY` is set)
//! 2. POST a JSON payload to `NOTIFY_WEBHOOK_URL` (DIY delivery)
//! 3. Disabled (log only)

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;

use crate::config::NotifyConfig;
use crate::error::{AppError, Result};
use crate::models::NotificationKind;

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Format a Unix timestamp as a human-readable date (e.g., "Jan 15, 2024")
pub fn format_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "Unknown date".to_string())
}

/// Title and body for a license notification.
pub fn notice_text(
    kind: NotificationKind,
    product_name: &str,
    expires_at: Option<i64>,
) -> (String, String) {
    let expiry = expires_at.map(format_date);
    match kind {
        NotificationKind::LicenseIssued => (
            format!("Your {} license is ready", product_name),
            match expiry {
                Some(date) => format!(
                    "Thanks for your purchase. Your {} license is active until {}.",
                    product_name, date
                ),
                None => format!(
                    "Thanks for your purchase. Your {} license is active and does not expire.",
                    product_name
                ),
            },
        ),
        NotificationKind::LicenseExpiring => (
            format!("Your {} license expires soon", product_name),
            format!(
                "Your {} license expires on {}. Renew before then to keep using it.",
                product_name,
                expiry.unwrap_or_else(|| "an upcoming date".to_string())
            ),
        ),
        NotificationKind::LicenseExpiringUrgent => (
            format!("Your {} license expires within 24 hours", product_name),
            format!(
                "Last reminder: your {} license expires on {}. Renew now to avoid interruption.",
                product_name,
                expiry.unwrap_or_else(|| "an upcoming date".to_string())
            ),
        ),
    }
}

/// Where a notification ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Email sent via Resend
    Sent,
    /// Payload POSTed to the configured webhook
    WebhookCalled,
    /// No delivery channel configured
    Disabled,
}

/// One notification addressed to one customer.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundNotice<'a> {
    pub kind: NotificationKind,
    pub to_email: &'a str,
    pub to_name: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub license_id: Option<&'a str>,
    pub product_name: &'a str,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event: &'a str,
    #[serde(flatten)]
    notice: &'a OutboundNotice<'a>,
    sent_at: i64,
}

#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: String,
}

#[derive(Clone)]
pub struct NotificationService {
    resend_api_key: Option<String>,
    webhook_url: Option<String>,
    from_email: String,
    base_url: String,
    http_client: Client,
}

impl NotificationService {
    pub fn new(config: &NotifyConfig, base_url: &str) -> Self {
        Self {
            resend_api_key: config.resend_api_key.clone(),
            webhook_url: config.webhook_url.clone(),
            from_email: config.from_email.clone(),
            base_url: base_url.to_string(),
            http_client: Client::new(),
        }
    }

    /// Service that records nothing outbound. Used in dev and tests.
    pub fn disabled() -> Self {
        Self::new(&NotifyConfig::default(), "http://localhost")
    }

    pub fn is_enabled(&self) -> bool {
        self.resend_api_key.is_some() || self.webhook_url.is_some()
    }

    /// Deliver a notice through the first configured channel (Resend, then webhook).
    pub async fn deliver(&self, notice: &OutboundNotice<'_>) -> Result<DeliveryResult> {
        if let Some(ref api_key) = self.resend_api_key {
            let request = ResendEmailRequest {
                from: &self.from_email,
                to: vec![notice.to_email],
                subject: notice.title,
                text: format!(
                    "Hi {},\n\n{}\n\nManage your licenses at {}/account/licenses\n",
                    notice.to_name, notice.message, self.base_url
                ),
            };
            self.send_with_retry(notice, || {
                self.http_client
                    .post(RESEND_API_URL)
                    .bearer_auth(api_key)
                    .json(&request)
            })
            .await?;
            return Ok(DeliveryResult::Sent);
        }

        if let Some(ref webhook_url) = self.webhook_url {
            let payload = WebhookPayload {
                event: notice.kind.as_ref(),
                notice,
                sent_at: Utc::now().timestamp(),
            };
            self.send_with_retry(notice, || self.http_client.post(webhook_url).json(&payload))
                .await?;
            return Ok(DeliveryResult::WebhookCalled);
        }

        tracing::debug!(
            kind = notice.kind.as_ref(),
            to = %notice.to_email,
            "Notification delivery disabled, in-app record only"
        );
        Ok(DeliveryResult::Disabled)
    }

    /// Send with exponential backoff. Network errors, 429 and 5xx are retried;
    /// other 4xx fail immediately.
    async fn send_with_retry<F>(&self, notice: &OutboundNotice<'_>, build: F) -> Result<()>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error: Option<AppError> = None;

        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            if *delay_secs > 0 {
                tracing::warn!(attempt, delay_secs, "Retrying notification after transient failure");
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            let response = match build().send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "Notification request failed");
                    last_error = Some(e.into());
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                tracing::info!(
                    kind = notice.kind.as_ref(),
                    to = %notice.to_email,
                    attempt,
                    "Notification delivered"
                );
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            let error = AppError::Internal(format!("Notification delivery failed: {} - {}", status, body));
            if status.as_u16() == 429 || status.is_server_error() {
                tracing::warn!(status = %status, "Notification channel returned transient error");
                last_error = Some(error);
            } else {
                return Err(error);
            }
        }

        tracing::error!(
            kind = notice.kind.as_ref(),
            to = %notice.to_email,
            attempts = RETRY_DELAYS.len() + 1,
            "Notification delivery failed after all retries"
        );
        Err(last_error.unwrap_or_else(|| {
            AppError::Internal("Notification delivery failed: all retries exhausted".into())
        }))
    }
}
