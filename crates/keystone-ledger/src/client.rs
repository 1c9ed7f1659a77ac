use async_trait::async_trait;
use keystone_contracts::{Escrow, ExternalCondition};
use keystone_core::{Address, BlockNumber, Timestamp, Wei};

use crate::error::LedgerError;
use crate::tx::{LogEntry, LogFilter, Receipt, Transaction};

/// Access to a ledger hosting Keystone contracts.
///
/// Implemented in-process by `InMemoryLedger` and over HTTP by
/// `HttpLedgerClient`. Transactions are applied in a single total order;
/// a reverted transaction is reported through its receipt, not as an error.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Height of the latest mined block.
    async fn block_number(&self) -> Result<BlockNumber, LedgerError>;

    /// Current ledger time.
    async fn now(&self) -> Result<Timestamp, LedgerError>;

    /// Submit a transaction and wait for its receipt.
    async fn send_transaction(&self, tx: Transaction) -> Result<Receipt, LedgerError>;

    /// Execute a transaction against the current state without committing it.
    async fn simulate(&self, tx: Transaction) -> Result<Receipt, LedgerError>;

    /// Logs matching the filter, in ledger order.
    async fn get_logs(&self, filter: LogFilter) -> Result<Vec<LogEntry>, LedgerError>;

    async fn balance(&self, address: Address) -> Result<Wei, LedgerError>;

    /// Read-only snapshot of an escrow.
    async fn escrow(&self, address: Address) -> Result<Escrow, LedgerError>;

    /// Full record of an external condition.
    async fn verifier_condition(&self, verifier: Address, condition_id: u64) -> Result<ExternalCondition, LedgerError>;

    async fn verify_condition_for_parties(
        &self,
        verifier: Address,
        condition_id: u64,
        expected_creator: Address,
        expected_beneficiary: Address,
    ) -> Result<bool, LedgerError>;
}
