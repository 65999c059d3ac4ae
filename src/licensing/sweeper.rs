use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;

use super::SECONDS_PER_DAY;
use crate::db::{AppState, queries};
use crate::error::Result;
use crate::models::{CreateNotification, LicenseWithDetails, NotificationKind};
use crate::notifications::{NotificationService, OutboundNotice, notice_text};

pub const WARNING_WINDOW_SECS: i64 = 7 * SECONDS_PER_DAY;
pub const URGENT_WINDOW_SECS: i64 = SECONDS_PER_DAY;

/// Summary returned to whoever triggered the sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub expired_licenses_marked: usize,
    /// Active licenses expiring in `[now, now + 7d)`
    pub expiring_in_7_days: usize,
    /// Active licenses expiring in `[now, now + 1d)`
    pub expiring_in_1_day: usize,
    /// Regular warnings newly recorded by this run
    pub notifications_sent: usize,
    /// Urgent warnings newly recorded by this run
    pub urgent_notifications_sent: usize,
}

struct PendingDelivery {
    kind: NotificationKind,
    license: LicenseWithDetails,
    title: String,
    message: String,
}

/// Outbound sends in flight at once while draining a sweep's notices.
pub const DELIVERY_CONCURRENCY: usize = 8;

/// Expire overdue licenses and warn owners of licenses about to expire.
///
/// Phases commit independently. Re-running is safe: already expired rows are
/// skipped, and each warning is keyed by (kind, license, expiry) so a license
/// is warned at most once per window. The in-app notices are recorded before
/// this returns; outbound delivery continues on a background task so a slow or
/// unreachable channel never holds up the trigger.
pub fn run_sweep(state: &AppState, now: i64) -> Result<SweepReport> {
    let (report, pending) = record_sweep(state, now)?;
    if !pending.is_empty() && state.notifier.is_enabled() {
        tokio::spawn(deliver_all(state.notifier.clone(), pending));
    }
    Ok(report)
}

/// Same as [`run_sweep`], but waits until every outbound notice has been
/// attempted. For one-shot runs that exit right after.
pub async fn run_sweep_and_deliver(state: &AppState, now: i64) -> Result<SweepReport> {
    let (report, pending) = record_sweep(state, now)?;
    if !pending.is_empty() && state.notifier.is_enabled() {
        deliver_all(state.notifier.clone(), pending).await;
    }
    Ok(report)
}

fn record_sweep(state: &AppState, now: i64) -> Result<(SweepReport, Vec<PendingDelivery>)> {
    let conn = state.db.get()?;
    let mut report = SweepReport::default();
    let mut pending = Vec::new();

    report.expired_licenses_marked = queries::expire_due_licenses(&conn, now)?;

    let expiring_soon = queries::list_licenses_expiring_within(&conn, now, WARNING_WINDOW_SECS)?;
    report.expiring_in_7_days = expiring_soon.len();
    for license in expiring_soon {
        if let Some(delivery) = record_warning(&conn, NotificationKind::LicenseExpiring, license)? {
            report.notifications_sent += 1;
            pending.push(delivery);
        }
    }

    let expiring_today = queries::list_licenses_expiring_within(&conn, now, URGENT_WINDOW_SECS)?;
    report.expiring_in_1_day = expiring_today.len();
    for license in expiring_today {
        if let Some(delivery) =
            record_warning(&conn, NotificationKind::LicenseExpiringUrgent, license)?
        {
            report.urgent_notifications_sent += 1;
            pending.push(delivery);
        }
    }

    tracing::info!(
        expired = report.expired_licenses_marked,
        expiring_7d = report.expiring_in_7_days,
        expiring_1d = report.expiring_in_1_day,
        warnings = report.notifications_sent,
        urgent = report.urgent_notifications_sent,
        "License sweep complete"
    );

    Ok((report, pending))
}

/// Send every pending notice, at most `DELIVERY_CONCURRENCY` at a time.
/// Returns the number of notices that could not be delivered.
async fn deliver_all(notifier: Arc<NotificationService>, pending: Vec<PendingDelivery>) -> usize {
    let total = pending.len();
    let mut queue = pending.into_iter();
    let mut in_flight = JoinSet::new();
    let mut failures = 0usize;

    loop {
        while in_flight.len() < DELIVERY_CONCURRENCY {
            let Some(delivery) = queue.next() else { break };
            let notifier = notifier.clone();
            in_flight.spawn(async move { deliver_one(&notifier, &delivery).await });
        }
        match in_flight.join_next().await {
            Some(Ok(true)) => {}
            Some(Ok(false)) => failures += 1,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Expiry warning delivery task aborted");
                failures += 1;
            }
            None => break,
        }
    }

    tracing::info!(total, failures, "Expiry warning delivery finished");
    failures
}

async fn deliver_one(notifier: &NotificationService, delivery: &PendingDelivery) -> bool {
    let notice = OutboundNotice {
        kind: delivery.kind,
        to_email: &delivery.license.user_email,
        to_name: &delivery.license.user_name,
        title: &delivery.title,
        message: &delivery.message,
        license_id: Some(&delivery.license.license.id),
        product_name: &delivery.license.product_name,
        expires_at: delivery.license.license.expires_at,
    };
    match notifier.deliver(&notice).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(
                license_id = %delivery.license.license.id,
                kind = delivery.kind.as_ref(),
                error = %e,
                "Failed to deliver expiry warning"
            );
            false
        }
    }
}

/// Record one warning. Returns None when this license was already warned for
/// this kind and expiry.
fn record_warning(
    conn: &rusqlite::Connection,
    kind: NotificationKind,
    license: LicenseWithDetails,
) -> Result<Option<PendingDelivery>> {
    let expires_at = license.license.expires_at;
    let (title, message) = notice_text(kind, &license.product_name, expires_at);
    let dedupe_key = format!(
        "{}:{}:{}",
        kind.as_ref(),
        license.license.id,
        expires_at.unwrap_or_default()
    );

    let recorded = queries::create_notification(
        conn,
        &CreateNotification {
            user_id: license.license.user_id.clone(),
            license_id: Some(license.license.id.clone()),
            kind,
            title: title.clone(),
            message: message.clone(),
            dedupe_key: Some(dedupe_key),
        },
    )?;

    Ok(recorded.map(|_| PendingDelivery {
        kind,
        license,
        title,
        message,
    }))
}
