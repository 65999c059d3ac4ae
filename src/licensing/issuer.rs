use rusqlite::Connection;

use super::{KeySource, compute_expires_at};
use crate::db::queries;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::models::{CreateLicense, CreateNotification, License, Notification, NotificationKind};
use crate::notifications::notice_text;

/// Draws per unit before issuance gives up on the whole order.
pub const MAX_KEY_ATTEMPTS: usize = 5;

/// In-app notice recorded for one order line, with what outbound delivery needs.
#[derive(Debug, Clone)]
pub struct IssuedNotice {
    pub notification: Notification,
    pub product_name: String,
    pub expires_at: Option<i64>,
}

/// Licenses minted for one order, plus the notices recorded for the buyer.
#[derive(Debug, Clone)]
pub struct Issuance {
    pub user_id: String,
    pub licenses: Vec<License>,
    pub notices: Vec<IssuedNotice>,
}

/// Mint one ACTIVE license per purchased unit of `order_id`.
///
/// Run this inside the same transaction that moved the order to paid. Any error
/// (including `KeyGeneration` after `MAX_KEY_ATTEMPTS` colliding draws for one
/// unit) must roll that transaction back so the order never ends up paid with
/// fewer licenses than units.
pub fn issue_licenses_for_order(
    conn: &Connection,
    order_id: &str,
    key_source: &mut dyn KeySource,
    now: i64,
) -> Result<Issuance> {
    let order = queries::get_order_by_id(conn, order_id)?.or_not_found(msg::ORDER_NOT_FOUND)?;

    if queries::count_licenses_for_order(conn, &order.id)? > 0 {
        return Err(AppError::Conflict(msg::ORDER_ALREADY_ISSUED.into()));
    }

    let items = queries::list_order_items(conn, &order.id)?;
    let mut licenses = Vec::new();
    let mut notices = Vec::with_capacity(items.len());

    for item in &items {
        let product = queries::get_product_by_id(conn, &item.product_id)?.ok_or_else(|| {
            AppError::Internal(format!(
                "Order item {} references missing product {}",
                item.id, item.product_id
            ))
        })?;

        let input = CreateLicense {
            license_key: String::new(),
            user_id: order.user_id.clone(),
            product_id: product.id.clone(),
            order_id: Some(order.id.clone()),
            order_item_id: Some(item.id.clone()),
            expires_at: compute_expires_at(now, product.duration_days),
            requires_hardware_binding: product.requires_hardware_binding,
        };

        let first_index = licenses.len();
        for unit in 0..item.quantity {
            licenses.push(mint_one(conn, &input, key_source, now, unit)?);
        }

        let (title, mut message) =
            notice_text(NotificationKind::LicenseIssued, &product.name, input.expires_at);
        if item.quantity > 1 {
            message.push_str(&format!(" {} licenses were issued.", item.quantity));
        }
        let notice = queries::create_notification(
            conn,
            &CreateNotification {
                user_id: order.user_id.clone(),
                license_id: licenses.get(first_index).map(|l| l.id.clone()),
                kind: NotificationKind::LicenseIssued,
                title,
                message,
                dedupe_key: Some(format!("license_issued:{}", item.id)),
            },
        )?;
        if let Some(notification) = notice {
            notices.push(IssuedNotice {
                notification,
                product_name: product.name.clone(),
                expires_at: input.expires_at,
            });
        }
    }

    tracing::info!(
        order_id = %order.id,
        user_id = %order.user_id,
        licenses = licenses.len(),
        "Issued licenses for paid order"
    );

    Ok(Issuance {
        user_id: order.user_id,
        licenses,
        notices,
    })
}

/// Insert a single license, drawing a fresh key after every collision.
fn mint_one(
    conn: &Connection,
    template: &CreateLicense,
    key_source: &mut dyn KeySource,
    now: i64,
    unit: i32,
) -> Result<License> {
    for attempt in 1..=MAX_KEY_ATTEMPTS {
        let input = CreateLicense {
            license_key: key_source.next_key(),
            ..template.clone()
        };
        if let Some(license) = queries::try_insert_license(conn, &input, now)? {
            return Ok(license);
        }
        tracing::warn!(
            order_item_id = ?template.order_item_id,
            unit,
            attempt,
            "License key collision, drawing a new key"
        );
    }

    Err(AppError::KeyGeneration(format!(
        "{} consecutive key collisions for order item {:?}",
        MAX_KEY_ATTEMPTS, template.order_item_id
    )))
}
