use std::fmt;

use crate::error::CoreError;

/// The four states of an escrow lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum EscrowState {
    /// Deployed, awaiting the buyer's deposit.
    #[default]
    Init,
    /// Deposit locked; awaiting release or refund.
    Funded,
    /// Funds paid out to the seller. Final state.
    Released,
    /// Funds returned to the buyer. Final state.
    Refunded,
}

impl EscrowState {
    /// Whether this is a final (absorbing) state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }

    /// Numeric ABI encoding of the state.
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Init => 0,
            Self::Funded => 1,
            Self::Released => 2,
            Self::Refunded => 3,
        }
    }

    /// Decode a state from its numeric ABI encoding.
    pub fn from_u8(value: u8) -> Result<Self, CoreError> {
        match value {
            0 => Ok(Self::Init),
            1 => Ok(Self::Funded),
            2 => Ok(Self::Released),
            3 => Ok(Self::Refunded),
            other => Err(CoreError::InvalidStateValue(other)),
        }
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Funded => write!(f, "Funded"),
            Self::Released => write!(f, "Released"),
            Self::Refunded => write!(f, "Refunded"),
        }
    }
}

/// Actions that move an escrow through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowAction {
    /// The buyer locked the deposit.
    Deposit,
    /// The seller settled the escrow.
    Release,
    /// The buyer reclaimed the deposit after the timeout.
    Refund,
}

impl fmt::Display for EscrowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => write!(f, "deposit"),
            Self::Release => write!(f, "release"),
            Self::Refund => write!(f, "refund"),
        }
    }
}

/// Manages escrow state transitions.
///
/// Valid transitions:
/// - Init → Funded (Deposit)
/// - Funded → Released (Release)
/// - Funded → Refunded (Refund)
///
/// Nothing re-enters Init or Funded, and both terminal states are absorbing.
pub struct EscrowStateMachine;

impl EscrowStateMachine {
    /// Attempt a state transition.
    /// Returns the new state on success, or an error for invalid transitions.
    pub fn transition(current: EscrowState, action: EscrowAction) -> Result<EscrowState, CoreError> {
        let new_state = match (current, action) {
            (EscrowState::Init, EscrowAction::Deposit) => EscrowState::Funded,
            (EscrowState::Funded, EscrowAction::Release) => EscrowState::Released,
            (EscrowState::Funded, EscrowAction::Refund) => EscrowState::Refunded,
            _ => {
                return Err(CoreError::InvalidStateTransition {
                    from: current,
                    action,
                })
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            action = %action,
            "escrow state transition"
        );

        Ok(new_state)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: EscrowState, action: EscrowAction) -> bool {
        Self::transition(current, action).is_ok()
    }
}
