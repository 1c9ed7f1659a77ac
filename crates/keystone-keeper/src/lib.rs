//! Keystone Settlement Keeper
//!
//! Watches registered condition verifiers for `ConditionFulfilled` events and
//! calls `release` on every linked escrow whose seller it acts for.

pub mod config;
pub mod error;
pub mod keeper;
pub mod processed;
pub mod registry;

pub use config::KeeperConfig;
pub use error::KeeperError;
pub use keeper::{ReleaseAttempt, ReleaseOutcome, SettlementKeeper, TickReport};
pub use processed::ProcessedConditions;
pub use registry::{DeploymentFile, DeploymentRecord, EscrowEntry, LinkedContracts, Registry};
