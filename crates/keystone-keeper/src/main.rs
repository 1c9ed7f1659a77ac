//! Keystone Settlement Keeper: entry point.
//!
//! Watches the configured ledger for fulfilled external conditions and
//! releases the linked escrows on behalf of the seller.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use keystone_core::Address;
use keystone_keeper::{KeeperConfig, Registry, SettlementKeeper};
use keystone_ledger::HttpLedgerClient;
use tracing_subscriber::EnvFilter;

/// Keystone Settlement Keeper
#[derive(Parser, Debug)]
#[command(name = "keystone-keeper", version, about = "Keystone Settlement Keeper")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "keeper.toml")]
    config: PathBuf,

    /// Seller account the keeper acts for.
    #[arg(long)]
    identity: Option<Address>,

    /// Override the deployment records path.
    #[arg(long)]
    deployments: Option<PathBuf>,

    /// Override the ledger endpoint.
    #[arg(long)]
    endpoint: Option<String>,

    /// Override the poll interval, in seconds.
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Generate a default config file and exit.
    #[arg(long)]
    init: bool,
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration, then apply CLI overrides
    let mut config = KeeperConfig::load(&args.config)?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_tracing(&config.logging.level, &config.logging.format);

    if args.init {
        config.save(&args.config)?;
        tracing::info!(path = %args.config.display(), "wrote default config");
        return Ok(());
    }

    if let Some(identity) = args.identity {
        config.keeper.identity = Some(identity);
    }
    if let Some(deployments) = args.deployments {
        config.keeper.deployments_path = deployments;
    }
    if let Some(endpoint) = args.endpoint {
        config.ledger.endpoint = endpoint;
    }
    if let Some(secs) = args.poll_interval {
        config.keeper.poll_interval_secs = secs;
    }

    tracing::info!("Keystone Settlement Keeper v{}", env!("CARGO_PKG_VERSION"));

    let identity = config
        .keeper
        .identity
        .context("no keeper identity configured (set [keeper].identity or pass --identity)")?;
    let registry = Registry::load(&config.keeper.deployments_path)?;
    let ledger = HttpLedgerClient::new(&config.ledger.endpoint, config.request_timeout())?;
    tracing::info!(endpoint = %ledger.endpoint(), "connecting to ledger");

    let mut keeper = SettlementKeeper::new(Arc::new(ledger), identity, registry, config.poll_interval());
    keeper.start().await?;
    tracing::info!(
        interval_secs = config.poll_interval().as_secs(),
        "polling for fulfilled conditions, press Ctrl+C to stop"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("received shutdown signal");
    };

    keeper.run(shutdown).await?;
    keeper.shutdown();
    tracing::info!("keeper exited cleanly");
    Ok(())
}
