//! Keystone Devnet: entry point.
//!
//! Runs an in-memory ledger with pre-funded development accounts and serves
//! it over HTTP for the keeper and local tooling.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use keystone_devnet::{start_api_server, DevnetConfig, DevnetState};
use tracing_subscriber::EnvFilter;

/// Keystone Devnet
#[derive(Parser, Debug)]
#[command(name = "keystone-devnet", version, about = "Keystone local development ledger")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "devnet.toml")]
    config: PathBuf,

    /// Override the API port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the API listen address.
    #[arg(long)]
    listen_addr: Option<String>,

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

    let mut config = DevnetConfig::load(&args.config)?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_tracing(&config.logging.level, &config.logging.format);

    if args.init {
        config.save(&args.config)?;
        tracing::info!(path = %args.config.display(), "wrote default config");
        return Ok(());
    }

    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(addr) = args.listen_addr {
        config.api.listen_addr = addr;
    }

    tracing::info!("Keystone Devnet v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(network = %config.network.name, accounts = config.genesis.accounts.len(), "initializing ledger");

    let state = Arc::new(DevnetState::from_config(&config)?);
    let listen_addr = config.api_socket_addr()?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("received shutdown signal");
    };

    start_api_server(listen_addr, state, shutdown).await?;
    tracing::info!("devnet exited cleanly");
    Ok(())
}
