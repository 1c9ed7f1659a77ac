use std::time::Duration;

use async_trait::async_trait;
use keystone_contracts::{Escrow, ExternalCondition};
use keystone_core::{Address, BlockNumber, Timestamp, Wei};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::LedgerClient;
use crate::error::LedgerError;
use crate::tx::{LogEntry, LogFilter, Receipt, Transaction};
use crate::wire::{
    AdvanceTimeRequest, AdvanceTimeResponse, ErrorResponse, Query, QueryResponse, StatusResponse,
    ADVANCE_TIME_PATH, LOGS_PATH, QUERY_PATH, SIMULATE_PATH, STATUS_PATH, TRANSACTIONS_PATH,
};

/// `LedgerClient` over a devnet's HTTP API.
pub struct HttpLedgerClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpLedgerClient {
    /// Create a client for `endpoint` (e.g. `http://127.0.0.1:8545`).
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn decode<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, LedgerError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let message = match resp.json::<ErrorResponse>().await {
            Ok(err) => err.error,
            Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
        };
        Err(LedgerError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, LedgerError> {
        let resp = self.client.get(format!("{}{}", self.endpoint, path)).send().await?;
        Self::decode(resp).await
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, LedgerError> {
        let resp = self
            .client
            .post(format!("{}{}", self.endpoint, path))
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn query(&self, query: Query) -> Result<QueryResponse, LedgerError> {
        self.post(QUERY_PATH, &query).await
    }

    pub async fn status(&self) -> Result<StatusResponse, LedgerError> {
        self.get(STATUS_PATH).await
    }

    /// Move the devnet clock forward. Returns the new ledger time.
    pub async fn advance_time(&self, seconds: u64) -> Result<Timestamp, LedgerError> {
        let resp: AdvanceTimeResponse = self.post(ADVANCE_TIME_PATH, &AdvanceTimeRequest { seconds }).await?;
        Ok(resp.now)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn block_number(&self) -> Result<BlockNumber, LedgerError> {
        match self.query(Query::BlockNumber).await? {
            QueryResponse::BlockNumber(n) => Ok(n),
            other => Err(other.unexpected("block_number")),
        }
    }

    async fn now(&self) -> Result<Timestamp, LedgerError> {
        match self.query(Query::Now).await? {
            QueryResponse::Now(ts) => Ok(ts),
            other => Err(other.unexpected("now")),
        }
    }

    async fn send_transaction(&self, tx: Transaction) -> Result<Receipt, LedgerError> {
        tracing::debug!(endpoint = %self.endpoint, call = %tx.call.describe(), "submitting transaction");
        self.post(TRANSACTIONS_PATH, &tx).await
    }

    async fn simulate(&self, tx: Transaction) -> Result<Receipt, LedgerError> {
        self.post(SIMULATE_PATH, &tx).await
    }

    async fn get_logs(&self, filter: LogFilter) -> Result<Vec<LogEntry>, LedgerError> {
        self.post(LOGS_PATH, &filter).await
    }

    async fn balance(&self, address: Address) -> Result<Wei, LedgerError> {
        match self.query(Query::Balance { address }).await? {
            QueryResponse::Balance(wei) => Ok(wei),
            other => Err(other.unexpected("balance")),
        }
    }

    async fn escrow(&self, address: Address) -> Result<Escrow, LedgerError> {
        match self.query(Query::Escrow { address }).await? {
            QueryResponse::Escrow(escrow) => Ok(*escrow),
            other => Err(other.unexpected("escrow")),
        }
    }

    async fn verifier_condition(&self, verifier: Address, condition_id: u64) -> Result<ExternalCondition, LedgerError> {
        match self
            .query(Query::VerifierCondition {
                verifier,
                condition_id,
            })
            .await?
        {
            QueryResponse::VerifierCondition(condition) => Ok(condition),
            other => Err(other.unexpected("verifier_condition")),
        }
    }

    async fn verify_condition_for_parties(
        &self,
        verifier: Address,
        condition_id: u64,
        expected_creator: Address,
        expected_beneficiary: Address,
    ) -> Result<bool, LedgerError> {
        let query = Query::VerifyConditionForParties {
            verifier,
            condition_id,
            creator: expected_creator,
            beneficiary: expected_beneficiary,
        };
        match self.query(query).await? {
            QueryResponse::Verified(verified) => Ok(verified),
            other => Err(other.unexpected("verified")),
        }
    }
}
