//! Application configuration loaded from environment variables.

use std::time::Duration;

use consumers::DEFAULT_ITEM_TIMEOUT;
use domain::DEFAULT_TOLERANCE_SECS;
use fanout::{FROM_EMAIL_KEY, PREVIOUS_WEBHOOK_SECRET_KEY, SecretBundle, WEBHOOK_SECRET_KEY};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `SECRETS_NAME`: secret bundle holding webhook and sender secrets
/// - `WEBHOOK_TOLERANCE_SECS`: signature timestamp tolerance
/// - `DATABASE_URL`: PostgreSQL order store when set, in-memory otherwise
/// - `BATCH_SIZE`, `MAX_RECEIVE_COUNT`: queue worker settings
/// - `ITEM_TIMEOUT_SECS`: deadline for handling one queued item
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub secrets_name: String,
    pub tolerance_secs: i64,
    pub database_url: Option<String>,
    pub batch_size: usize,
    pub max_receive_count: u32,
    pub item_timeout: Duration,
    pub poll_interval: Duration,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("HOST", defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: env_or("RUST_LOG", defaults.log_level),
            log_format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            secrets_name: env_or("SECRETS_NAME", defaults.secrets_name),
            tolerance_secs: env_or("WEBHOOK_TOLERANCE_SECS", defaults.tolerance_secs),
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            batch_size: env_or("BATCH_SIZE", defaults.batch_size).max(1),
            max_receive_count: env_or("MAX_RECEIVE_COUNT", defaults.max_receive_count).max(1),
            item_timeout: Duration::from_secs(
                env_or("ITEM_TIMEOUT_SECS", defaults.item_timeout.as_secs()).max(1),
            ),
            poll_interval: defaults.poll_interval,
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
            log_format: LogFormat::Text,
            secrets_name: "stripe-webhook".to_string(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            database_url: None,
            batch_size: 10,
            max_receive_count: 5,
            item_timeout: DEFAULT_ITEM_TIMEOUT,
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Builds the secret bundle from `STRIPE_WEBHOOK_SECRET`,
/// `STRIPE_WEBHOOK_SECRET_PREVIOUS` and `NOTIFICATION_FROM_EMAIL`.
pub fn secrets_from_env(name: &str) -> SecretBundle {
    [
        ("STRIPE_WEBHOOK_SECRET", WEBHOOK_SECRET_KEY),
        ("STRIPE_WEBHOOK_SECRET_PREVIOUS", PREVIOUS_WEBHOOK_SECRET_KEY),
        ("NOTIFICATION_FROM_EMAIL", FROM_EMAIL_KEY),
    ]
    .into_iter()
    .fold(SecretBundle::new(name), |bundle, (var, key)| {
        match std::env::var(var) {
            Ok(value) => bundle.with(key, value),
            Err(_) => bundle,
        }
    })
}
