use keystone_core::{Address, CoreError, Timestamp, Wei};
use serde::{Deserialize, Serialize};

/// Contract-level errors. Any of these aborts the call with no effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ContractError {
    /// The caller does not hold the role the operation requires.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The operation is not valid in the contract's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid or zero amount, or an otherwise malformed argument.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("condition index {index} out of range ({count} conditions)")]
    IndexOutOfRange { index: u64, count: u64 },

    #[error("condition {0} already fulfilled")]
    AlreadyFulfilled(u64),

    #[error("timeout not elapsed: refund possible after {deadline}, ledger time is {now}")]
    TimeoutNotElapsed { deadline: Timestamp, now: Timestamp },

    /// The internal and/or external gate is unsatisfied.
    #[error("conditions not met: {0}")]
    ConditionsNotMet(String),

    #[error("condition capacity of {0} reached")]
    CapacityExceeded(usize),

    #[error("unknown condition {0}")]
    UnknownCondition(u64),

    #[error("transfer of {amount} to {to} failed: {reason}")]
    TransferFailed {
        to: Address,
        amount: Wei,
        reason: String,
    },
}

impl From<CoreError> for ContractError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidStateTransition { .. } => ContractError::InvalidState(err.to_string()),
            other => ContractError::InvalidValue(other.to_string()),
        }
    }
}
