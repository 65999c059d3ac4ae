use chrono::Utc;
use rusqlite::{Connection, ToSql, params, types::Value};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    DOWNLOAD_COLS, LICENSE_COLS, LICENSE_WITH_DETAILS_COLS, NOTIFICATION_COLS, ORDER_COLS,
    ORDER_ITEM_COLS, PRODUCT_COLS, USER_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// True when the error is a UNIQUE constraint violation.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Borrow a list of owned SQL values as the `&[&dyn ToSql]` the query helpers take.
fn as_params(values: &[Value]) -> Vec<&dyn ToSql> {
    values.iter().map(|v| v as &dyn ToSql).collect()
}

/// Builder for dynamic UPDATE statements with optional fields.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
        }
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a column to an explicit value, NULL included.
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<V>) -> Self {
        self.fields
            .push((column, value.map(Into::into).unwrap_or(Value::Null)));
        self
    }

    fn execute(mut self, conn: &Connection) -> Result<bool> {
        if self.fields.is_empty() {
            return Ok(false);
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.table, sets.join(", "));
        self.fields.push(("id", Value::Text(self.id)));
        let values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(affected > 0)
    }
}

// ============ Users ============

pub fn create_user(conn: &Connection, input: &CreateUser) -> Result<User> {
    input.validate()?;
    let email = normalize_email(&input.email);
    if get_user_by_email(conn, &email)?.is_some() {
        return Err(AppError::Conflict("A user with this email already exists".into()));
    }

    let user = User {
        id: gen_id(),
        email,
        name: input.name.trim().to_string(),
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![&user.id, &user.email, &user.name, user.created_at],
    )?;
    Ok(user)
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let email = normalize_email(email);
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLS),
        &[&email],
    )
}

/// Find the customer by email or create them. The stored name is not overwritten
/// for returning customers.
pub fn upsert_user_by_email(conn: &Connection, email: &str, name: &str) -> Result<User> {
    let email = normalize_email(email);
    conn.execute(
        "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(email) DO NOTHING",
        params![gen_id(), &email, name.trim(), now()],
    )?;
    get_user_by_email(conn, &email)?
        .ok_or_else(|| AppError::Internal("User missing after upsert".into()))
}

// ============ Products ============

pub fn create_product(conn: &Connection, input: &CreateProduct) -> Result<Product> {
    let product = Product {
        id: gen_id(),
        name: input.name.trim().to_string(),
        slug: input.slug.clone(),
        description: input.description.clone(),
        price_cents: input.price_cents,
        currency: input.currency.trim().to_lowercase(),
        duration_days: input.duration_days,
        requires_hardware_binding: input.requires_hardware_binding,
        download_url: input.download_url.clone(),
        active: true,
        created_at: now(),
    };

    let result = conn.execute(
        "INSERT INTO products (id, name, slug, description, price_cents, currency, duration_days, requires_hardware_binding, download_url, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)",
        params![
            &product.id,
            &product.name,
            &product.slug,
            &product.description,
            product.price_cents,
            &product.currency,
            product.duration_days,
            product.requires_hardware_binding as i32,
            &product.download_url,
            product.created_at
        ],
    );

    match result {
        Ok(_) => Ok(product),
        Err(e) if is_unique_violation(&e) => Err(AppError::Conflict(format!(
            "A product with slug '{}' already exists",
            product.slug
        ))),
        Err(e) => Err(e.into()),
    }
}

pub fn get_product_by_id(conn: &Connection, id: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLS),
        &[&id],
    )
}

pub fn list_products_paginated(
    conn: &Connection,
    include_inactive: bool,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Product>, i64)> {
    let filter = if include_inactive { "" } else { "WHERE active = 1" };
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM products {}", filter),
        [],
        |row| row.get(0),
    )?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM products {} ORDER BY created_at DESC, name LIMIT ?1 OFFSET ?2",
            PRODUCT_COLS, filter
        ),
        &[&limit, &offset],
    )?;
    Ok((items, total))
}

pub fn update_product(conn: &Connection, id: &str, input: &UpdateProduct) -> Result<Option<Product>> {
    UpdateBuilder::new("products", id)
        .set_opt("name", input.name.as_ref().map(|n| n.trim().to_string()))
        .set_opt("price_cents", input.price_cents)
        .set_opt(
            "requires_hardware_binding",
            input.requires_hardware_binding.map(|b| b as i32),
        )
        .set_opt("active", input.active.map(|b| b as i32))
        .pipe_nullable("description", input.description.clone())
        .pipe_nullable("duration_days", input.duration_days)
        .pipe_nullable("download_url", input.download_url.clone())
        .execute(conn)?;

    get_product_by_id(conn, id)
}

impl UpdateBuilder {
    /// `None` leaves the column alone; `Some(v)` writes `v` (NULL included).
    fn pipe_nullable<V: Into<Value>>(self, column: &'static str, value: Option<Option<V>>) -> Self {
        match value {
            Some(v) => self.set_nullable(column, v),
            None => self,
        }
    }
}

// ============ Orders ============

/// Create a pending order with its line items in one transaction.
pub fn create_order(
    conn: &mut Connection,
    user_id: &str,
    currency: &str,
    items: &[NewOrderItem],
) -> Result<OrderWithItems> {
    let total_cents: i64 = items
        .iter()
        .map(|i| i.unit_price_cents * i.quantity as i64)
        .sum();

    let order = Order {
        id: gen_id(),
        user_id: user_id.to_string(),
        status: OrderStatus::Pending,
        total_cents,
        currency: currency.to_string(),
        payment_reference: None,
        created_at: now(),
        paid_at: None,
    };

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO orders (id, user_id, status, total_cents, currency, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &order.id,
            &order.user_id,
            order.status.as_ref(),
            order.total_cents,
            &order.currency,
            order.created_at
        ],
    )?;

    let mut order_items = Vec::with_capacity(items.len());
    for item in items {
        let order_item = OrderItem {
            id: gen_id(),
            order_id: order.id.clone(),
            product_id: item.product_id.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
        };
        tx.execute(
            "INSERT INTO order_items (id, order_id, product_id, quantity, unit_price_cents)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &order_item.id,
                &order_item.order_id,
                &order_item.product_id,
                order_item.quantity,
                order_item.unit_price_cents
            ],
        )?;
        order_items.push(order_item);
    }
    tx.commit()?;

    Ok(OrderWithItems {
        order,
        items: order_items,
    })
}

pub fn get_order_by_id(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )
}

pub fn list_order_items(conn: &Connection, order_id: &str) -> Result<Vec<OrderItem>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY rowid",
            ORDER_ITEM_COLS
        ),
        &[&order_id],
    )
}

pub fn get_order_with_items(conn: &Connection, id: &str) -> Result<Option<OrderWithItems>> {
    let Some(order) = get_order_by_id(conn, id)? else {
        return Ok(None);
    };
    let items = list_order_items(conn, &order.id)?;
    Ok(Some(OrderWithItems { order, items }))
}

pub fn list_orders_paginated(
    conn: &Connection,
    status: Option<OrderStatus>,
    user_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Order>, i64)> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(status) = status {
        clauses.push("status = ?");
        values.push(Value::Text(status.as_ref().to_string()));
    }
    if let Some(user_id) = user_id {
        clauses.push("user_id = ?");
        values.push(Value::Text(user_id.to_string()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM orders {}", where_sql),
        rusqlite::params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    values.push(Value::Integer(limit));
    values.push(Value::Integer(offset));
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM orders {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            ORDER_COLS, where_sql
        ),
        &as_params(&values),
    )?;
    Ok((items, total))
}

/// Atomically move an order from pending to paid.
/// Returns false if the order was not pending (already paid, failed, or unknown),
/// which callers treat as "someone else handled this callback".
pub fn try_mark_order_paid(
    conn: &Connection,
    order_id: &str,
    payment_reference: &str,
    paid_at: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = 'paid', paid_at = ?1, payment_reference = ?2
         WHERE id = ?3 AND status = 'pending'",
        params![paid_at, payment_reference, order_id],
    )?;
    Ok(affected > 0)
}

/// Atomically move an order from pending to failed.
pub fn try_mark_order_failed(
    conn: &Connection,
    order_id: &str,
    payment_reference: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = 'failed', payment_reference = ?1
         WHERE id = ?2 AND status = 'pending'",
        params![payment_reference, order_id],
    )?;
    Ok(affected > 0)
}

// ============ Licenses ============

/// Insert a license row. Returns `Ok(None)` when the key is already taken so the
/// caller can draw a fresh key; any other failure is an error.
pub fn try_insert_license(
    conn: &Connection,
    input: &CreateLicense,
    created_at: i64,
) -> Result<Option<License>> {
    let license = License {
        id: gen_id(),
        license_key: input.license_key.clone(),
        user_id: input.user_id.clone(),
        product_id: input.product_id.clone(),
        order_id: input.order_id.clone(),
        order_item_id: input.order_item_id.clone(),
        status: LicenseStatus::Active,
        expires_at: input.expires_at,
        requires_hardware_binding: input.requires_hardware_binding,
        hardware_fingerprint: None,
        hardware_bound_at: None,
        revoked_at: None,
        created_at,
    };

    let result = conn.execute(
        "INSERT INTO licenses (id, license_key, user_id, product_id, order_id, order_item_id, status, expires_at, requires_hardware_binding, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?8, ?9)",
        params![
            &license.id,
            &license.license_key,
            &license.user_id,
            &license.product_id,
            &license.order_id,
            &license.order_item_id,
            license.expires_at,
            license.requires_hardware_binding as i32,
            license.created_at
        ],
    );

    match result {
        Ok(_) => Ok(Some(license)),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_license_by_id(conn: &Connection, id: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE id = ?1", LICENSE_COLS),
        &[&id],
    )
}

/// Exact, case-sensitive key lookup (SQLite's default BINARY collation).
pub fn get_license_by_key(conn: &Connection, license_key: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE license_key = ?1", LICENSE_COLS),
        &[&license_key],
    )
}

pub fn get_license_with_details(conn: &Connection, id: &str) -> Result<Option<LicenseWithDetails>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM licenses l
             JOIN products p ON p.id = l.product_id
             JOIN users u ON u.id = l.user_id
             WHERE l.id = ?1",
            LICENSE_WITH_DETAILS_COLS
        ),
        &[&id],
    )
}

pub fn count_licenses_for_order(conn: &Connection, order_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM licenses WHERE order_id = ?1",
        params![order_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn list_licenses_for_order(conn: &Connection, order_id: &str) -> Result<Vec<License>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses WHERE order_id = ?1 ORDER BY created_at, rowid",
            LICENSE_COLS
        ),
        &[&order_id],
    )
}

pub fn list_licenses_paginated(
    conn: &Connection,
    filter: &LicenseFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<LicenseWithDetails>, i64)> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(status) = filter.status {
        clauses.push("l.status = ?");
        values.push(Value::Text(status.as_ref().to_string()));
    }
    if let Some(ref user_id) = filter.user_id {
        clauses.push("l.user_id = ?");
        values.push(Value::Text(user_id.clone()));
    }
    if let Some(ref product_id) = filter.product_id {
        clauses.push("l.product_id = ?");
        values.push(Value::Text(product_id.clone()));
    }
    if let Some(ref order_id) = filter.order_id {
        clauses.push("l.order_id = ?");
        values.push(Value::Text(order_id.clone()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM licenses l {}", where_sql),
        rusqlite::params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    values.push(Value::Integer(limit));
    values.push(Value::Integer(offset));
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses l
             JOIN products p ON p.id = l.product_id
             JOIN users u ON u.id = l.user_id
             {} ORDER BY l.created_at DESC, l.rowid DESC LIMIT ? OFFSET ?",
            LICENSE_WITH_DETAILS_COLS, where_sql
        ),
        &as_params(&values),
    )?;
    Ok((items, total))
}

/// Expire one license if it is still active and past its expiry.
/// Returns false when there was nothing to do (already expired by someone else,
/// revoked, perpetual, or not yet due).
pub fn expire_license_if_due(conn: &Connection, id: &str, now: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET status = 'expired'
         WHERE id = ?1 AND status = 'active' AND expires_at IS NOT NULL AND expires_at < ?2",
        params![id, now],
    )?;
    Ok(affected > 0)
}

/// Expire every active license past its expiry. Returns the number of rows changed.
pub fn expire_due_licenses(conn: &Connection, now: i64) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE licenses SET status = 'expired'
         WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at < ?1",
        params![now],
    )?;
    Ok(affected)
}

/// Pin an ACTIVE license to a hardware fingerprint, only if it is not pinned yet.
/// Returns true if this call did the binding; false if it was already pinned or
/// is no longer active.
pub fn try_bind_hardware(conn: &Connection, id: &str, fingerprint: &str, now: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET hardware_fingerprint = ?1, hardware_bound_at = ?2
         WHERE id = ?3 AND status = 'active' AND hardware_fingerprint IS NULL",
        params![fingerprint, now, id],
    )?;
    Ok(affected > 0)
}

/// Clear the hardware binding so the next validation re-pins. Revoked licenses stay as they are.
pub fn release_hardware(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET hardware_fingerprint = NULL, hardware_bound_at = NULL
         WHERE id = ?1 AND status != 'revoked' AND hardware_fingerprint IS NOT NULL",
        params![id],
    )?;
    Ok(affected > 0)
}

/// Revoke a license. Returns false if it was already revoked (terminal state).
pub fn revoke_license(conn: &Connection, id: &str, now: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET status = 'revoked', revoked_at = ?1
         WHERE id = ?2 AND status != 'revoked'",
        params![now, id],
    )?;
    Ok(affected > 0)
}

/// Active licenses whose expiry falls in `[now, now + window_secs)`, soonest first.
pub fn list_licenses_expiring_within(
    conn: &Connection,
    now: i64,
    window_secs: i64,
) -> Result<Vec<LicenseWithDetails>> {
    let until = now + window_secs;
    query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses l
             JOIN products p ON p.id = l.product_id
             JOIN users u ON u.id = l.user_id
             WHERE l.status = 'active' AND l.expires_at IS NOT NULL
               AND l.expires_at >= ?1 AND l.expires_at < ?2
             ORDER BY l.expires_at, l.rowid",
            LICENSE_WITH_DETAILS_COLS
        ),
        &[&now, &until],
    )
}

// ============ Downloads ============

pub fn record_download(
    conn: &Connection,
    license_id: &str,
    user_id: &str,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<Download> {
    let download = Download {
        id: gen_id(),
        license_id: license_id.to_string(),
        user_id: user_id.to_string(),
        ip_address: ip_address.map(String::from),
        user_agent: user_agent.map(String::from),
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO downloads (id, license_id, user_id, ip_address, user_agent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &download.id,
            &download.license_id,
            &download.user_id,
            &download.ip_address,
            &download.user_agent,
            download.created_at
        ],
    )?;
    Ok(download)
}

pub fn list_downloads_for_license(conn: &Connection, license_id: &str) -> Result<Vec<Download>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM downloads WHERE license_id = ?1 ORDER BY created_at DESC, rowid DESC",
            DOWNLOAD_COLS
        ),
        &[&license_id],
    )
}

// ============ Notifications ============

/// Record an in-app notification. Returns `Ok(None)` when a notification with the
/// same dedupe key already exists.
pub fn create_notification(
    conn: &Connection,
    input: &CreateNotification,
) -> Result<Option<Notification>> {
    let notification = Notification {
        id: gen_id(),
        user_id: input.user_id.clone(),
        license_id: input.license_id.clone(),
        kind: input.kind,
        title: input.title.clone(),
        message: input.message.clone(),
        read: false,
        created_at: now(),
    };

    let affected = conn.execute(
        "INSERT OR IGNORE INTO notifications (id, user_id, license_id, kind, title, message, read, dedupe_key, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
        params![
            &notification.id,
            &notification.user_id,
            &notification.license_id,
            notification.kind.as_ref(),
            &notification.title,
            &notification.message,
            &input.dedupe_key,
            notification.created_at
        ],
    )?;

    Ok((affected > 0).then_some(notification))
}

pub fn list_notifications_for_user(
    conn: &Connection,
    user_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Notification>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM notifications WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
            NOTIFICATION_COLS
        ),
        &[&user_id, &limit, &offset],
    )?;
    Ok((items, total))
}

pub fn mark_notification_read(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(affected > 0)
}
