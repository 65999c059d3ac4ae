//! Row-to-model mapping for the query layer.
//!
//! Models implement `FromRow` against the matching `*_COLS` constant, so a
//! query is `query_one(conn, &format!("SELECT {} FROM ...", LICENSE_COLS), ...)`.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a text column into an enum, surfacing bad values as a column type error
/// instead of panicking.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// A model that can be read from a row selected with its `*_COLS` list.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// First matching row, or None.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// Column lists, in the order each `from_row` reads them

pub const USER_COLS: &str = "id, email, name, created_at";

pub const PRODUCT_COLS: &str = "id, name, slug, description, price_cents, currency, duration_days, requires_hardware_binding, download_url, active, created_at";

pub const ORDER_COLS: &str =
    "id, user_id, status, total_cents, currency, payment_reference, created_at, paid_at";

pub const ORDER_ITEM_COLS: &str = "id, order_id, product_id, quantity, unit_price_cents";

pub const LICENSE_COLS: &str = "id, license_key, user_id, product_id, order_id, order_item_id, status, expires_at, requires_hardware_binding, hardware_fingerprint, hardware_bound_at, revoked_at, created_at";

/// License columns qualified with `l.` followed by product/user display columns.
pub const LICENSE_WITH_DETAILS_COLS: &str = "l.id, l.license_key, l.user_id, l.product_id, l.order_id, l.order_item_id, l.status, l.expires_at, l.requires_hardware_binding, l.hardware_fingerprint, l.hardware_bound_at, l.revoked_at, l.created_at, p.name, u.name, u.email";

pub const DOWNLOAD_COLS: &str = "id, license_id, user_id, ip_address, user_agent, created_at";

pub const NOTIFICATION_COLS: &str =
    "id, user_id, license_id, kind, title, message, read, created_at";


impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

impl FromRow for Product {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Product {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            description: row.get(3)?,
            price_cents: row.get(4)?,
            currency: row.get(5)?,
            duration_days: row.get(6)?,
            requires_hardware_binding: row.get::<_, i32>(7)? != 0,
            download_url: row.get(8)?,
            active: row.get::<_, i32>(9)? != 0,
            created_at: row.get(10)?,
        })
    }
}

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            user_id: row.get(1)?,
            status: parse_enum(row, 2, "status")?,
            total_cents: row.get(3)?,
            currency: row.get(4)?,
            payment_reference: row.get(5)?,
            created_at: row.get(6)?,
            paid_at: row.get(7)?,
        })
    }
}

impl FromRow for OrderItem {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(OrderItem {
            id: row.get(0)?,
            order_id: row.get(1)?,
            product_id: row.get(2)?,
            quantity: row.get(3)?,
            unit_price_cents: row.get(4)?,
        })
    }
}

impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(License {
            id: row.get(0)?,
            license_key: row.get(1)?,
            user_id: row.get(2)?,
            product_id: row.get(3)?,
            order_id: row.get(4)?,
            order_item_id: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            expires_at: row.get(7)?,
            requires_hardware_binding: row.get::<_, i32>(8)? != 0,
            hardware_fingerprint: row.get(9)?,
            hardware_bound_at: row.get(10)?,
            revoked_at: row.get(11)?,
            created_at: row.get(12)?,
        })
    }
}

impl FromRow for LicenseWithDetails {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LicenseWithDetails {
            license: License::from_row(row)?,
            product_name: row.get(13)?,
            user_name: row.get(14)?,
            user_email: row.get(15)?,
        })
    }
}

impl FromRow for Download {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Download {
            id: row.get(0)?,
            license_id: row.get(1)?,
            user_id: row.get(2)?,
            ip_address: row.get(3)?,
            user_agent: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for Notification {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Notification {
            id: row.get(0)?,
            user_id: row.get(1)?,
            license_id: row.get(2)?,
            kind: parse_enum(row, 3, "kind")?,
            title: row.get(4)?,
            message: row.get(5)?,
            read: row.get::<_, i32>(6)? != 0,
            created_at: row.get(7)?,
        })
    }
}
