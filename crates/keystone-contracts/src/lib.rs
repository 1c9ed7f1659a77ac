//! Keystone Contracts
//!
//! The two on-ledger state machines of the protocol: an `Escrow` that
//! custodies a single deposit behind internal milestones and one external
//! condition, and a shared `ConditionVerifier` registry of deposit-threshold
//! conditions. Contracts are executed by a ledger through a `CallContext`;
//! every call either applies fully or returns an error with no effect.

pub mod context;
pub mod error;
pub mod escrow;
pub mod events;
pub mod traits;
pub mod verifier;

pub use context::{CallContext, ValueLedger};
pub use error::ContractError;
pub use escrow::{Escrow, EscrowCall, EscrowParams, EscrowSummary, ExternalConditionLink, InternalCondition};
pub use events::{ContractEvent, EscrowEvent, EventKind, VerifierEvent};
pub use traits::ConditionGate;
pub use verifier::{ConditionType, ConditionVerifier, ExternalCondition, VerifierCall};
