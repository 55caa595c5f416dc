use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Application configuration, layered from an optional `config/{env}.toml`
/// file and `APP_`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to create missing tables on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Payment gateway base URL
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,

    /// Payment gateway API key
    #[serde(default)]
    pub gateway_api_key: Option<String>,

    /// Shared secret for inbound webhook signature verification.
    /// When unset, signatures are not checked and a warning is logged.
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Allowed clock skew for signed webhook timestamps, in seconds
    #[serde(default = "default_webhook_tolerance")]
    pub payment_webhook_tolerance_secs: u64,

    /// How long a staged order may wait for a terminal webhook
    #[serde(default = "default_staged_order_ttl")]
    pub staged_order_ttl_secs: u64,

    /// How often the reaper sweeps expired staged orders
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_gateway_base_url() -> String {
    "http://localhost:9050".to_string()
}
fn default_webhook_tolerance() -> u64 {
    300
}
fn default_staged_order_ttl() -> u64 {
    // 24 hours; an abandoned checkout never receives a webhook
    24 * 3600
}
fn default_reaper_interval() -> u64 {
    15 * 60
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling.
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: default_host(),
            port: default_port(),
            environment: "test".to_string(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: 1,
            db_min_connections: 1,
            gateway_base_url: default_gateway_base_url(),
            gateway_api_key: None,
            payment_webhook_secret: None,
            payment_webhook_tolerance_secs: default_webhook_tolerance(),
            staged_order_ttl_secs: default_staged_order_ttl(),
            reaper_interval_secs: default_reaper_interval(),
        }
    }
}

/// Loads the configuration for the current `APP_ENVIRONMENT` (or
/// "development"), merging file and environment sources.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment =
        std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let file = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
    if file.exists() {
        builder = builder.add_source(File::from(file));
    }

    let cfg: AppConfig = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    Ok(cfg)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let cfg = AppConfig::for_database("sqlite::memory:");
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.staged_order_ttl_secs, 24 * 3600);
        assert!(cfg.payment_webhook_secret.is_none());
    }
}
