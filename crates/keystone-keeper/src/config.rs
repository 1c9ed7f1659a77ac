//! Keeper configuration loading and management.

use keystone_core::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full configuration for the settlement keeper.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeeperConfig {
    /// Ledger connection settings.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Keeper behaviour.
    #[serde(default)]
    pub keeper: KeeperSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Base URL of the ledger HTTP API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperSettings {
    /// Account the keeper submits releases as. Must be the escrow seller.
    #[serde(default)]
    pub identity: Option<Address>,
    /// Deployment records written by the deploy tooling.
    #[serde(default = "default_deployments_path")]
    pub deployments_path: PathBuf,
    /// Seconds between polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8545".into()
}
fn default_request_timeout() -> u64 {
    10
}
fn default_deployments_path() -> PathBuf {
    PathBuf::from("deployments/testnet.json")
}
fn default_poll_interval() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for KeeperSettings {
    fn default() -> Self {
        Self {
            identity: None,
            deployments_path: default_deployments_path(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl KeeperConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: KeeperConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.keeper.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger.request_timeout_secs)
    }
}
