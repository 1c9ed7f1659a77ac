//! Keystone Devnet
//!
//! A single-process development ledger: an `InMemoryLedger` seeded with
//! genesis balances and served over an HTTP API.

pub mod api;
pub mod config;
pub mod state;

pub use api::{build_router, serve, start_api_server};
pub use config::DevnetConfig;
pub use state::DevnetState;
