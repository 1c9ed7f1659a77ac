use std::fmt;

use keystone_contracts::{ContractError, ContractEvent, EscrowCall, EscrowParams, EventKind, VerifierCall};
use keystone_core::{Address, BlockNumber, TxHash, Wei};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Kinds of contract a ledger can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractKind {
    Escrow,
    ConditionVerifier,
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Escrow => write!(f, "Escrow"),
            Self::ConditionVerifier => write!(f, "ConditionVerifier"),
        }
    }
}

/// What a transaction does. A closed set: there is no call-by-name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Call {
    DeployVerifier,
    DeployEscrow(EscrowParams),
    Escrow { address: Address, call: EscrowCall },
    Verifier { address: Address, call: VerifierCall },
    /// Plain value transfer between accounts.
    Transfer { to: Address },
}

impl Call {
    /// Short name for logging.
    pub fn describe(&self) -> String {
        match self {
            Self::DeployVerifier => "deploy ConditionVerifier".into(),
            Self::DeployEscrow(_) => "deploy Escrow".into(),
            Self::Escrow { address, call } => format!("Escrow({address}).{}", call.name()),
            Self::Verifier { address, call } => format!("ConditionVerifier({address}).{}", call.name()),
            Self::Transfer { to } => format!("transfer to {to}"),
        }
    }
}

/// A signed-by-convention state change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    #[serde(default)]
    pub value: Wei,
    pub call: Call,
}

impl Transaction {
    pub fn new(from: Address, call: Call) -> Self {
        Self {
            from,
            value: Wei::ZERO,
            call,
        }
    }

    /// Attach value to the transaction.
    pub fn with_value(mut self, value: Wei) -> Self {
        self.value = value;
        self
    }

    pub fn escrow(from: Address, address: Address, call: EscrowCall) -> Self {
        Self::new(from, Call::Escrow { address, call })
    }

    pub fn verifier(from: Address, address: Address, call: VerifierCall) -> Self {
        Self::new(from, Call::Verifier { address, call })
    }
}

/// Why a transaction reverted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum RevertReason {
    #[error("{0}")]
    Contract(ContractError),

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Wei, available: Wei },

    #[error("no contract at {0}")]
    NoContract(Address),

    #[error("contract at {address} is not a {expected}")]
    WrongContractKind { address: Address, expected: ContractKind },

    #[error("value sent to non-payable target: {0}")]
    NotPayable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    Reverted(RevertReason),
}

/// Outcome of a mined (or simulated) transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: BlockNumber,
    pub from: Address,
    pub status: TxStatus,
    /// Set for successful deployments.
    pub contract_address: Option<Address>,
    pub logs: Vec<LogEntry>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        matches!(self.status, TxStatus::Success)
    }

    pub fn revert_reason(&self) -> Option<&RevertReason> {
        match &self.status {
            TxStatus::Success => None,
            TxStatus::Reverted(reason) => Some(reason),
        }
    }

    /// The contract error behind a revert, if the contract raised one.
    pub fn contract_error(&self) -> Option<&ContractError> {
        match self.revert_reason() {
            Some(RevertReason::Contract(err)) => Some(err),
            _ => None,
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &ContractEvent> {
        self.logs.iter().map(|log| &log.event)
    }

    /// Turn a reverted receipt into an error.
    pub fn into_result(self) -> Result<Receipt, LedgerError> {
        match self.status {
            TxStatus::Success => Ok(self),
            TxStatus::Reverted(reason) => Err(LedgerError::Reverted(reason)),
        }
    }
}

/// An event as recorded by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract.
    pub address: Address,
    pub block_number: BlockNumber,
    pub tx_hash: TxHash,
    /// Position within the block.
    pub log_index: u64,
    pub event: ContractEvent,
}

/// Selects logs by emitter, kind and block range (inclusive).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Empty matches every emitter.
    #[serde(default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub kind: Option<EventKind>,
    #[serde(default)]
    pub from_block: BlockNumber,
    #[serde(default)]
    pub to_block: Option<BlockNumber>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn addresses(mut self, addresses: impl IntoIterator<Item = Address>) -> Self {
        self.addresses = addresses.into_iter().collect();
        self
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn blocks(mut self, from_block: BlockNumber, to_block: BlockNumber) -> Self {
        self.from_block = from_block;
        self.to_block = Some(to_block);
        self
    }

    pub fn matches(&self, log: &LogEntry) -> bool {
        if log.block_number < self.from_block {
            return false;
        }
        if self.to_block.is_some_and(|to| log.block_number > to) {
            return false;
        }
        if !self.addresses.is_empty() && !self.addresses.contains(&log.address) {
            return false;
        }
        match self.kind {
            Some(kind) => log.event.kind() == kind,
            None => true,
        }
    }
}
