//! Contract events.
//!
//! Names and fields match the published event interface so that off-chain
//! consumers (the keeper, audit tooling) can decode them unambiguously.

use keystone_core::{Address, Wei};
use serde::{Deserialize, Serialize};

/// Events emitted by an `Escrow`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "args")]
pub enum EscrowEvent {
    Deposited { buyer: Address, amount: Wei },
    ConditionAdded { index: u64, description: String },
    ConditionFulfilled { index: u64 },
    Released { seller: Address, amount: Wei },
    Refunded { buyer: Address, amount: Wei },
}

/// Events emitted by a `ConditionVerifier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "args")]
pub enum VerifierEvent {
    ConditionCreated {
        condition_id: u64,
        creator: Address,
        beneficiary: Address,
        required_amount: Wei,
    },
    ConditionFulfilled { condition_id: u64 },
    EthForwarded { beneficiary: Address, amount: Wei },
}

/// Any event a contract can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "contract", content = "data")]
pub enum ContractEvent {
    Escrow(EscrowEvent),
    Verifier(VerifierEvent),
}

/// Discriminant of a `ContractEvent`, used for log filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    EscrowDeposited,
    EscrowConditionAdded,
    EscrowConditionFulfilled,
    EscrowReleased,
    EscrowRefunded,
    VerifierConditionCreated,
    VerifierConditionFulfilled,
    VerifierEthForwarded,
}

impl EventKind {
    /// The event's interface name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EscrowDeposited => "Deposited",
            Self::EscrowConditionAdded => "ConditionAdded",
            Self::EscrowConditionFulfilled | Self::VerifierConditionFulfilled => "ConditionFulfilled",
            Self::EscrowReleased => "Released",
            Self::EscrowRefunded => "Refunded",
            Self::VerifierConditionCreated => "ConditionCreated",
            Self::VerifierEthForwarded => "EthForwarded",
        }
    }
}

impl ContractEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Escrow(EscrowEvent::Deposited { .. }) => EventKind::EscrowDeposited,
            Self::Escrow(EscrowEvent::ConditionAdded { .. }) => EventKind::EscrowConditionAdded,
            Self::Escrow(EscrowEvent::ConditionFulfilled { .. }) => EventKind::EscrowConditionFulfilled,
            Self::Escrow(EscrowEvent::Released { .. }) => EventKind::EscrowReleased,
            Self::Escrow(EscrowEvent::Refunded { .. }) => EventKind::EscrowRefunded,
            Self::Verifier(VerifierEvent::ConditionCreated { .. }) => EventKind::VerifierConditionCreated,
            Self::Verifier(VerifierEvent::ConditionFulfilled { .. }) => EventKind::VerifierConditionFulfilled,
            Self::Verifier(VerifierEvent::EthForwarded { .. }) => EventKind::VerifierEthForwarded,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}

impl From<EscrowEvent> for ContractEvent {
    fn from(event: EscrowEvent) -> Self {
        Self::Escrow(event)
    }
}

impl From<VerifierEvent> for ContractEvent {
    fn from(event: VerifierEvent) -> Self {
        Self::Verifier(event)
    }
}
