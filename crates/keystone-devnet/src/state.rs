//! Shared devnet state, accessible from HTTP handlers.

use std::sync::Arc;
use std::time::Instant;

use keystone_core::Wei;
use keystone_ledger::InMemoryLedger;

use crate::config::DevnetConfig;

pub struct DevnetState {
    pub ledger: Arc<InMemoryLedger>,
    pub network: String,
    /// When the devnet started.
    pub start_time: Instant,
}

impl DevnetState {
    pub fn new(ledger: Arc<InMemoryLedger>, network: impl Into<String>) -> Self {
        Self {
            ledger,
            network: network.into(),
            start_time: Instant::now(),
        }
    }

    /// Build a wall-clock ledger and credit the configured genesis accounts.
    pub fn from_config(config: &DevnetConfig) -> anyhow::Result<Self> {
        let ledger = Arc::new(InMemoryLedger::new());
        for account in &config.genesis.accounts {
            let balance = ledger.fund(account.address, Wei::from_ether(account.balance_ether))?;
            tracing::info!(address = %account.address, balance_ether = %balance.format_ether(), "genesis account");
        }
        Ok(Self::new(ledger, config.network.name.clone()))
    }
}
