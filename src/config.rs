//! Configuration loader and validator for the storefront sync daemon.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub platform: Platform,
    pub feeds: Feeds,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_ms: u64,
    pub max_backoff_seconds: u64,
    /// Adjustments stuck in `processing` longer than this revert to `pending`.
    #[serde(default = "default_stale_processing_minutes")]
    pub stale_processing_minutes: i64,
}

fn default_stale_processing_minutes() -> i64 {
    30
}

/// Credentials and endpoint for the storefront platform API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Platform {
    pub base_url: String,
    pub api_login: String,
    pub api_key: String,
}

/// XML feed endpoints. The partial feed is optional; the partial sync
/// becomes a warning-level no-op when it is absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feeds {
    pub full_products_url: String,
    #[serde(default)]
    pub partial_products_url: Option<String>,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }
    if cfg.app.stale_processing_minutes <= 0 {
        return Err(ConfigError::Invalid(
            "app.stale_processing_minutes must be > 0",
        ));
    }

    if cfg.platform.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("platform.base_url must be non-empty"));
    }
    if cfg.platform.api_login.trim().is_empty() {
        return Err(ConfigError::Invalid("platform.api_login must be non-empty"));
    }
    if cfg.platform.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("platform.api_key must be non-empty"));
    }

    if cfg.feeds.full_products_url.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "feeds.full_products_url must be non-empty",
        ));
    }
    if let Some(url) = &cfg.feeds.partial_products_url {
        if url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "feeds.partial_products_url must be non-empty when set",
            ));
        }
    }

    Ok(())
}

/// Canonical example configuration, also used by tests.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_ms: 500
  max_backoff_seconds: 300
  stale_processing_minutes: 30

platform:
  base_url: "https://shop.example.com/api/v2"
  api_login: "YOUR_API_LOGIN"
  api_key: "YOUR_API_KEY"

feeds:
  full_products_url: "https://shop.example.com/export/products-full.xml"
  partial_products_url: "https://shop.example.com/export/products-availability.xml"
"#
}
