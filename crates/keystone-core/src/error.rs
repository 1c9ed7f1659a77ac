use crate::state_machine::{EscrowAction, EscrowState};

/// Core protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("invalid escrow transition: cannot {action} from {from}")]
    InvalidStateTransition {
        from: EscrowState,
        action: EscrowAction,
    },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid escrow state value: {0}")]
    InvalidStateValue(u8),

    #[error("amount overflow")]
    AmountOverflow,
}
