mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::licensing::ValidationPolicy;
use crate::notifications::NotificationService;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (catalog, orders, licenses, downloads, notifications)
    pub db: DbPool,
    /// Base URL for links in outbound notifications
    pub base_url: String,
    /// Bearer secret for the lifecycle sweep trigger (None = always reject)
    pub cron_secret: Option<String>,
    /// Bearer key for the admin API (None = always reject)
    pub admin_api_key: Option<String>,
    /// HMAC secret for payment callbacks (None = always reject)
    pub payment_webhook_secret: Option<String>,
    /// Prefix for newly minted license keys (e.g., "GT")
    pub license_key_prefix: String,
    pub validation_policy: ValidationPolicy,
    pub notifier: Arc<NotificationService>,
}

impl AppState {
    pub fn new(db: DbPool, config: &Config) -> Self {
        Self {
            db,
            base_url: config.base_url.clone(),
            cron_secret: config.cron_secret.clone(),
            admin_api_key: config.admin_api_key.clone(),
            payment_webhook_secret: config.payment_webhook_secret.clone(),
            license_key_prefix: config.license_key_prefix.clone(),
            validation_policy: ValidationPolicy {
                require_fingerprint: config.require_hardware_fingerprint,
            },
            notifier: Arc::new(NotificationService::new(&config.notify, &config.base_url)),
        }
    }
}

/// Open a pool where every connection runs in WAL mode, waits on locks instead of
/// failing with SQLITE_BUSY, and enforces foreign keys.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
    });
    Pool::builder().max_size(10).build(manager)
}
