//! Configuration file loading.
//!
//! The configuration is a TOML file in the style of the mail proxy's own
//! configuration:
//!
//! ```toml
//! [Proxy]
//! Address = "127.0.0.1:24242"
//! DataDir = "/var/lib/mailproxy"
//!
//! [Logging]
//! Level = "NOTICE"
//!
//! [[Account]]
//! User = "alice"
//! Provider = "provider1"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

use crate::account::Account;

/// Errors that can occur while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "Proxy")]
    pub proxy: ProxyConfig,

    #[serde(rename = "Logging", default)]
    pub logging: LoggingConfig,

    #[serde(rename = "Account", default)]
    pub accounts: Vec<Account>,
}

/// Where to find the mixnet proxy daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// `host:port` of the daemon's control socket
    #[serde(rename = "Address")]
    pub address: String,

    /// Directory the daemon keeps account keys in, forwarded on key
    /// generation
    #[serde(rename = "DataDir", default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(rename = "Level", default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load and validate the configuration at `path`.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.proxy.address.trim().is_empty() {
            return Err(ConfigError::Invalid("Proxy.Address must not be empty".into()));
        }

        parse_level(&self.logging.level)?;

        for account in &self.accounts {
            if account.user().is_empty() || account.provider().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "account '{account}' needs both a User and a Provider"
                )));
            }
        }

        Ok(())
    }

    /// The account the autoresponder answers for: the first one configured.
    pub fn primary_account(&self) -> Result<&Account, ConfigError> {
        self.accounts
            .first()
            .ok_or_else(|| ConfigError::Invalid("at least one [[Account]] is required".into()))
    }

    pub fn log_level(&self) -> LevelFilter {
        // Checked in `validate`.
        parse_level(&self.logging.level).unwrap_or(LevelFilter::INFO)
    }
}

/// Accepts tracing level names as well as the mail proxy's own
/// (`NOTICE`, `WARNING`).
fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    match level.to_ascii_lowercase().as_str() {
        "off" => Ok(LevelFilter::OFF),
        "error" => Ok(LevelFilter::ERROR),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "notice" | "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        _ => Err(ConfigError::Invalid(format!(
            "unknown Logging.Level '{level}'"
        ))),
    }
}
