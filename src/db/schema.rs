use rusqlite::Connection;

/// Initialize the database schema. Safe to run on every startup.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Customers (identity only; authentication is handled upstream)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Catalog
        -- duration_days: NULL = perpetual licenses
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
            currency TEXT NOT NULL DEFAULT 'usd',
            duration_days INTEGER CHECK (duration_days IS NULL OR duration_days > 0),
            requires_hardware_binding INTEGER NOT NULL DEFAULT 0,
            download_url TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );

        -- Orders. The pending -> paid transition is the only trigger for license issuance.
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            status TEXT NOT NULL CHECK (status IN ('pending', 'paid', 'failed', 'cancelled')),
            total_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            payment_reference TEXT,
            created_at INTEGER NOT NULL,
            paid_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);

        CREATE TABLE IF NOT EXISTS order_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id),
            product_id TEXT NOT NULL REFERENCES products(id),
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            unit_price_cents INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);

        -- Licenses: one row per purchased unit, never deleted.
        -- expires_at is written once at issuance.
        -- hardware_fingerprint is written at most once, by a conditional update.
        CREATE TABLE IF NOT EXISTS licenses (
            id TEXT PRIMARY KEY,
            license_key TEXT NOT NULL,
            user_id TEXT NOT NULL REFERENCES users(id),
            product_id TEXT NOT NULL REFERENCES products(id),
            order_id TEXT REFERENCES orders(id),
            order_item_id TEXT REFERENCES order_items(id),
            status TEXT NOT NULL CHECK (status IN ('active', 'expired', 'revoked')),
            expires_at INTEGER,
            requires_hardware_binding INTEGER NOT NULL DEFAULT 0,
            hardware_fingerprint TEXT,
            hardware_bound_at INTEGER,
            revoked_at INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_licenses_key ON licenses(license_key);
        CREATE INDEX IF NOT EXISTS idx_licenses_user ON licenses(user_id);
        CREATE INDEX IF NOT EXISTS idx_licenses_product ON licenses(product_id);
        CREATE INDEX IF NOT EXISTS idx_licenses_order ON licenses(order_id);
        CREATE INDEX IF NOT EXISTS idx_licenses_active_expiry ON licenses(expires_at) WHERE status = 'active';

        -- Download audit log (append-only)
        CREATE TABLE IF NOT EXISTS downloads (
            id TEXT PRIMARY KEY,
            license_id TEXT NOT NULL REFERENCES licenses(id),
            user_id TEXT NOT NULL REFERENCES users(id),
            ip_address TEXT,
            user_agent TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_downloads_license ON downloads(license_id);

        -- In-app notifications
        -- dedupe_key: unique when set, so INSERT OR IGNORE records a notice at most once
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            license_id TEXT REFERENCES licenses(id),
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            dedupe_key TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_notifications_dedupe ON notifications(dedupe_key) WHERE dedupe_key IS NOT NULL;
        "#,
    )
}
