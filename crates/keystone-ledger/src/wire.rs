//! JSON types shared by the devnet HTTP API and `HttpLedgerClient`.

use keystone_contracts::{Escrow, ExternalCondition};
use keystone_core::{Address, BlockNumber, Timestamp, Wei};
use serde::{Deserialize, Serialize};

use crate::client::LedgerClient;
use crate::error::LedgerError;

pub const STATUS_PATH: &str = "/api/v1/status";
pub const TRANSACTIONS_PATH: &str = "/api/v1/transactions";
pub const SIMULATE_PATH: &str = "/api/v1/simulate";
pub const LOGS_PATH: &str = "/api/v1/logs";
pub const QUERY_PATH: &str = "/api/v1/query";
pub const ADVANCE_TIME_PATH: &str = "/api/v1/time/advance";

/// Typed read queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", content = "params", rename_all = "snake_case")]
pub enum Query {
    BlockNumber,
    Now,
    Balance {
        address: Address,
    },
    Escrow {
        address: Address,
    },
    VerifierCondition {
        verifier: Address,
        condition_id: u64,
    },
    VerifyConditionForParties {
        verifier: Address,
        condition_id: u64,
        creator: Address,
        beneficiary: Address,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum QueryResponse {
    BlockNumber(BlockNumber),
    Now(Timestamp),
    Balance(Wei),
    Escrow(Box<Escrow>),
    VerifierCondition(ExternalCondition),
    Verified(bool),
}

impl QueryResponse {
    fn variant(&self) -> &'static str {
        match self {
            Self::BlockNumber(_) => "block_number",
            Self::Now(_) => "now",
            Self::Balance(_) => "balance",
            Self::Escrow(_) => "escrow",
            Self::VerifierCondition(_) => "verifier_condition",
            Self::Verified(_) => "verified",
        }
    }

    pub(crate) fn unexpected(&self, wanted: &str) -> LedgerError {
        LedgerError::UnexpectedResponse(format!("expected {wanted}, got {}", self.variant()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceTimeRequest {
    pub seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceTimeResponse {
    pub now: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub block_number: BlockNumber,
    pub now: Timestamp,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Answer a read query against any ledger.
pub async fn serve_query(ledger: &dyn LedgerClient, query: Query) -> Result<QueryResponse, LedgerError> {
    Ok(match query {
        Query::BlockNumber => QueryResponse::BlockNumber(ledger.block_number().await?),
        Query::Now => QueryResponse::Now(ledger.now().await?),
        Query::Balance { address } => QueryResponse::Balance(ledger.balance(address).await?),
        Query::Escrow { address } => QueryResponse::Escrow(Box::new(ledger.escrow(address).await?)),
        Query::VerifierCondition {
            verifier,
            condition_id,
        } => QueryResponse::VerifierCondition(ledger.verifier_condition(verifier, condition_id).await?),
        Query::VerifyConditionForParties {
            verifier,
            condition_id,
            creator,
            beneficiary,
        } => QueryResponse::Verified(
            ledger
                .verify_condition_for_parties(verifier, condition_id, creator, beneficiary)
                .await?,
        ),
    })
}
