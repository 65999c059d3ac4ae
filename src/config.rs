use std::env;

/// Outbound notification delivery settings.
#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    /// Resend API key. Takes precedence over the webhook when both are set.
    pub resend_api_key: Option<String>,
    /// Endpoint that receives notification payloads as JSON (DIY delivery)
    pub webhook_url: Option<String>,
    pub from_email: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub dev_mode: bool,
    /// Shared secret for the lifecycle sweep trigger. None = sweep endpoint always 401.
    pub cron_secret: Option<String>,
    /// Bearer key for the admin API. None = admin API always 401.
    pub admin_api_key: Option<String>,
    /// HMAC secret used by the payment gateway to sign callbacks.
    pub payment_webhook_secret: Option<String>,
    pub license_key_prefix: String,
    /// Reject validation of hardware-bound licenses when no fingerprint is presented.
    pub require_hardware_fingerprint: bool,
    pub notify: NotifyConfig,
}

/// Treat empty strings as unset so `FOO=` in a .env file disables the feature.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("TOOLVAULT_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let cron_secret = non_empty_var("CRON_SECRET");
        if cron_secret.is_none() {
            tracing::warn!("CRON_SECRET not set - license sweep endpoint will reject all requests");
        }

        let admin_api_key = non_empty_var("ADMIN_API_KEY");
        if admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not set - admin API will reject all requests");
        }

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "toolvault.db".to_string()),
            base_url,
            dev_mode,
            cron_secret,
            admin_api_key,
            payment_webhook_secret: non_empty_var("PAYMENT_WEBHOOK_SECRET"),
            license_key_prefix: non_empty_var("LICENSE_KEY_PREFIX")
                .unwrap_or_else(|| "GT".to_string()),
            require_hardware_fingerprint: env::var("REQUIRE_HARDWARE_FINGERPRINT")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            notify: NotifyConfig {
                resend_api_key: non_empty_var("RESEND_API_KEY"),
                webhook_url: non_empty_var("NOTIFY_WEBHOOK_URL"),
                from_email: env::var("NOTIFY_FROM_EMAIL")
                    .unwrap_or_else(|_| "licenses@toolvault.local".to_string()),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
