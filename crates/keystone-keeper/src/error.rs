use std::path::PathBuf;

use keystone_ledger::LedgerError;

/// Keeper errors.
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("failed to read deployments file {path}: {source}")]
    DeploymentsIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed deployments file {path}: {source}")]
    DeploymentsFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("keeper not started")]
    NotStarted,
}
