//! Devnet configuration loading and management.

use keystone_core::Address;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Full configuration for the devnet.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DevnetConfig {
    /// API server settings.
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub network: NetworkSettings,

    /// Pre-funded accounts.
    #[serde(default)]
    pub genesis: GenesisConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen address.
    #[serde(default = "default_api_addr")]
    pub listen_addr: String,
    /// API port.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Name reported by the status endpoint and recorded in deployment files.
    #[serde(default = "default_network_name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    #[serde(default = "default_genesis_accounts")]
    pub accounts: Vec<GenesisAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance_ether: u64,
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

fn default_api_addr() -> String {
    "127.0.0.1".into()
}
fn default_api_port() -> u16 {
    8545
}
fn default_network_name() -> String {
    "keystone-devnet".into()
}
fn default_genesis_accounts() -> Vec<GenesisAccount> {
    (0..4)
        .map(|i| GenesisAccount {
            address: dev_account(i),
            balance_ether: 1000,
        })
        .collect()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

/// Deterministic development account `index`.
pub fn dev_account(index: u32) -> Address {
    Address::derive(format!("keystone/devnet/account/{index}").as_bytes())
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_api_addr(),
            port: default_api_port(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            name: default_network_name(),
        }
    }
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            accounts: default_genesis_accounts(),
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

impl DevnetConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: DevnetConfig = toml::from_str(&contents)?;
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

    pub fn api_socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.api.listen_addr, self.api.port).parse()?)
    }
}
