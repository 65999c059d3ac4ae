//! Payment gateway callback: the only path from a PENDING order to licenses.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::licensing::{self, IssuedNotice, RandomKeySource};
use crate::models::{NotificationKind, User};
use crate::notifications::{NotificationService, OutboundNotice};

/// Gateway result code for a captured payment.
pub const RESULT_CODE_SUCCESS: &str = "00";

pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCallback {
    pub order_id: String,
    pub transaction_id: String,
    pub result_code: String,
    pub amount_cents: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResponse {
    pub status: &'static str,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licenses_issued: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/payments/callback", post(payment_callback))
}

/// POST /payments/callback
///
/// Signature is checked over the raw body before anything is parsed. On a success
/// code the PENDING→PAID transition and license issuance share one transaction:
/// either both commit or the order stays PENDING for the gateway to retry.
pub async fn payment_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackResponse>> {
    let secret = state
        .payment_webhook_secret
        .as_deref()
        .ok_or(AppError::Unauthorized)?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    if !crypto::verify_payload_signature(secret, &body, signature) {
        tracing::warn!("Payment callback with invalid signature");
        return Err(AppError::Unauthorized);
    }

    let callback: PaymentCallback = serde_json::from_slice(&body)?;
    let now = Utc::now().timestamp();

    let mut conn = state.db.get()?;
    let order = queries::get_order_by_id(&conn, &callback.order_id)?.or_not_found(msg::ORDER_NOT_FOUND)?;

    if callback.result_code != RESULT_CODE_SUCCESS {
        let marked = queries::try_mark_order_failed(&conn, &order.id, &callback.transaction_id)?;
        tracing::info!(
            order_id = %order.id,
            result_code = %callback.result_code,
            marked,
            "Payment callback reported failure"
        );
        return Ok(Json(CallbackResponse {
            status: if marked { "failed" } else { "already_processed" },
            order_id: order.id,
            licenses_issued: None,
        }));
    }

    if callback.amount_cents != order.total_cents {
        tracing::warn!(
            order_id = %order.id,
            expected = order.total_cents,
            received = callback.amount_cents,
            "Payment amount mismatch"
        );
        return Err(AppError::BadRequest(msg::AMOUNT_MISMATCH.into()));
    }

    let tx = conn.transaction()?;
    if !queries::try_mark_order_paid(&tx, &order.id, &callback.transaction_id, now)? {
        tracing::info!(order_id = %order.id, status = order.status.as_ref(), "Duplicate payment callback ignored");
        return Ok(Json(CallbackResponse {
            status: "already_processed",
            order_id: order.id,
            licenses_issued: None,
        }));
    }

    let mut key_source = RandomKeySource::new(state.license_key_prefix.clone());
    // Dropping `tx` on error rolls back the paid transition too.
    let issuance = licensing::issue_licenses_for_order(&tx, &order.id, &mut key_source, now)?;
    let user = queries::get_user_by_id(&tx, &issuance.user_id)?;
    tx.commit()?;

    tracing::info!(
        order_id = %order.id,
        transaction_id = %callback.transaction_id,
        licenses = issuance.licenses.len(),
        "Order paid"
    );

    if let Some(user) = user {
        spawn_issue_deliveries(state.notifier.clone(), user, issuance.notices);
    }

    Ok(Json(CallbackResponse {
        status: "paid",
        order_id: order.id,
        licenses_issued: Some(issuance.licenses.len()),
    }))
}

/// Push "license ready" notices out of band so the gateway gets its answer now.
fn spawn_issue_deliveries(notifier: Arc<NotificationService>, user: User, notices: Vec<IssuedNotice>) {
    if notices.is_empty() || !notifier.is_enabled() {
        return;
    }
    tokio::spawn(async move {
        for issued in &notices {
            let notice = OutboundNotice {
                kind: NotificationKind::LicenseIssued,
                to_email: &user.email,
                to_name: &user.name,
                title: &issued.notification.title,
                message: &issued.notification.message,
                license_id: issued.notification.license_id.as_deref(),
                product_name: &issued.product_name,
                expires_at: issued.expires_at,
            };
            if let Err(e) = notifier.deliver(&notice).await {
                tracing::warn!(user_id = %user.id, error = %e, "Failed to deliver license issued notice");
            }
        }
    });
}
