use keystone_contracts::ContractError;
use keystone_core::Address;

use crate::tx::{ContractKind, RevertReason};

/// Ledger-layer errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("no contract at {0}")]
    NoContract(Address),

    #[error("contract at {address} is not a {expected}")]
    WrongContractKind {
        address: Address,
        expected: ContractKind,
    },

    /// A read against a contract failed.
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("transaction reverted: {0}")]
    Reverted(RevertReason),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("ledger API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LedgerError::Serialization(err.to_string())
        } else {
            LedgerError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}
