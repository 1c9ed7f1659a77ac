//! Keystone Ledger
//!
//! The boundary between the protocol and the ledger that hosts it:
//! transaction, receipt and log types, the `LedgerClient` trait the keeper
//! and tooling program against, an in-process totally ordered ledger, and an
//! HTTP client for a remote devnet.

pub mod client;
pub mod error;
pub mod memory;
pub mod remote;
pub mod tx;
pub mod wire;

pub use client::LedgerClient;
pub use error::LedgerError;
pub use memory::InMemoryLedger;
pub use remote::HttpLedgerClient;
pub use tx::{Call, ContractKind, LogEntry, LogFilter, Receipt, RevertReason, Transaction, TxStatus};
