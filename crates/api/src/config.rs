//! Application configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `PAYMENT_WEBHOOK_SECRET` — webhook signing secret (default: unset)
/// - `WEBHOOK_ALLOW_UNVERIFIED` — accept unsigned webhooks, development
///   only (default: `false`)
/// - `ABANDONED_CART_TIMEOUT_MINUTES` — reaper cutoff (default: `30`)
/// - `REAPER_INTERVAL_SECONDS` — reaper tick interval (default: `600`)
/// - `SEND_REMINDER_EMAILS` — abandoned-cart reminder flag (default: `false`)
/// - `NOTIFICATION_FROM_EMAIL` — sender address (default: `orders@example.com`)
/// - `FRONTEND_URL` — base URL for cart-resume links (default: `http://localhost:5173`)
/// - `IDEMPOTENCY_TTL_HOURS` — idempotency record TTL (default: `168`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub payment_webhook_secret: Option<String>,
    pub webhook_allow_unverified: bool,
    pub abandoned_cart_timeout_minutes: i64,
    pub reaper_interval_seconds: u64,
    pub send_reminder_emails: bool,
    pub notification_from_email: String,
    pub frontend_url: String,
    pub idempotency_ttl_hours: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("HOST", defaults.host),
            port: env_parsed("PORT", defaults.port),
            log_level: env_or("RUST_LOG", defaults.log_level),
            payment_webhook_secret: std::env::var("PAYMENT_WEBHOOK_SECRET").ok(),
            webhook_allow_unverified: env_parsed(
                "WEBHOOK_ALLOW_UNVERIFIED",
                defaults.webhook_allow_unverified,
            ),
            abandoned_cart_timeout_minutes: env_parsed(
                "ABANDONED_CART_TIMEOUT_MINUTES",
                defaults.abandoned_cart_timeout_minutes,
            ),
            reaper_interval_seconds: env_parsed(
                "REAPER_INTERVAL_SECONDS",
                defaults.reaper_interval_seconds,
            ),
            send_reminder_emails: env_parsed("SEND_REMINDER_EMAILS", defaults.send_reminder_emails),
            notification_from_email: env_or(
                "NOTIFICATION_FROM_EMAIL",
                defaults.notification_from_email,
            ),
            frontend_url: env_or("FRONTEND_URL", defaults.frontend_url),
            idempotency_ttl_hours: env_parsed(
                "IDEMPOTENCY_TTL_HOURS",
                defaults.idempotency_ttl_hours,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            payment_webhook_secret: None,
            webhook_allow_unverified: false,
            abandoned_cart_timeout_minutes: 30,
            reaper_interval_seconds: 600,
            send_reminder_emails: false,
            notification_from_email: "orders@example.com".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            idempotency_ttl_hours: 168,
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
