//! Fixtures shared by the cross-crate scenario tests.
//!
//! A [`Deal`] is one escrow wired to one external condition on a freshly
//! deployed verifier, the shape every end-to-end scenario starts from.

use std::sync::Arc;

use keystone_contracts::{EscrowCall, EscrowParams, VerifierCall};
use keystone_core::{Address, Timestamp, TxHash, Wei};
use keystone_keeper::{DeploymentFile, DeploymentRecord, LinkedContracts, Registry};
use keystone_ledger::{Call, InMemoryLedger, LedgerClient, LedgerError, Receipt, Transaction};

/// Ledger time at genesis for fixed-clock tests.
pub const GENESIS_TIME: Timestamp = 1_700_000_000;

/// One hour, the escrow timeout used by the scenarios.
pub const ONE_HOUR: u64 = 3600;

#[derive(Debug, Clone, Copy)]
pub struct Parties {
    pub buyer: Address,
    pub seller: Address,
    pub beneficiary: Address,
    pub outsider: Address,
}

impl Parties {
    pub fn new() -> Self {
        Self {
            buyer: Address::derive(b"scenario/buyer"),
            seller: Address::derive(b"scenario/seller"),
            beneficiary: Address::derive(b"scenario/beneficiary"),
            outsider: Address::derive(b"scenario/outsider"),
        }
    }
}

impl Default for Parties {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed-clock ledger with 100 ether credited to every party.
pub fn funded_ledger() -> Result<(Arc<InMemoryLedger>, Parties), LedgerError> {
    let ledger = Arc::new(InMemoryLedger::with_fixed_time(GENESIS_TIME));
    let parties = Parties::new();
    for account in [parties.buyer, parties.seller, parties.beneficiary, parties.outsider] {
        ledger.fund(account, Wei::from_ether(100))?;
    }
    Ok((ledger, parties))
}

/// An escrow linked to an external deposit condition.
#[derive(Debug, Clone)]
pub struct Deal {
    pub parties: Parties,
    pub verifier: Address,
    pub verifier_tx: TxHash,
    pub condition_id: u64,
    pub required_amount: Wei,
    pub escrow: Address,
    pub escrow_tx: TxHash,
    pub timeout: u64,
}

impl Deal {
    /// Deploy a verifier, have the buyer create the deposit condition, then
    /// deploy the escrow linked to it. The escrow is left in `Init`.
    pub async fn deploy(
        ledger: &dyn LedgerClient,
        parties: Parties,
        timeout: u64,
        required_amount: Wei,
    ) -> Result<Self, LedgerError> {
        let receipt = ledger
            .send_transaction(Transaction::new(parties.buyer, Call::DeployVerifier))
            .await?
            .into_result()?;
        let verifier_tx = receipt.tx_hash;
        let verifier = deployed(&receipt)?;

        let create = VerifierCall::CreateEthDepositCondition {
            beneficiary: parties.beneficiary,
            required_amount,
        };
        ledger
            .send_transaction(Transaction::verifier(parties.buyer, verifier, create))
            .await?
            .into_result()?;
        let condition_id = 1;

        let params = EscrowParams {
            seller: parties.seller,
            timeout,
            verifier,
            condition_id,
            beneficiary: parties.beneficiary,
        };
        let receipt = ledger
            .send_transaction(Transaction::new(parties.buyer, Call::DeployEscrow(params)))
            .await?
            .into_result()?;
        let escrow = deployed(&receipt)?;
        tracing::debug!(%escrow, %verifier, condition_id, "deal deployed");

        Ok(Self {
            parties,
            verifier,
            verifier_tx,
            condition_id,
            required_amount,
            escrow,
            escrow_tx: receipt.tx_hash,
            timeout,
        })
    }

    /// Submit an escrow call. Reverts come back as a reverted receipt.
    pub async fn escrow_call(
        &self,
        ledger: &dyn LedgerClient,
        from: Address,
        call: EscrowCall,
        value: Wei,
    ) -> Result<Receipt, LedgerError> {
        ledger
            .send_transaction(Transaction::escrow(from, self.escrow, call).with_value(value))
            .await
    }

    /// Pay toward the external condition.
    pub async fn pay_condition(
        &self,
        ledger: &dyn LedgerClient,
        from: Address,
        value: Wei,
    ) -> Result<Receipt, LedgerError> {
        let call = VerifierCall::DepositEth {
            condition_id: self.condition_id,
        };
        ledger
            .send_transaction(Transaction::verifier(from, self.verifier, call).with_value(value))
            .await
    }

    /// The deployment records the deploy tooling would have written for
    /// this deal.
    pub fn deployment_file(&self) -> DeploymentFile {
        let mut file = DeploymentFile::new("scenario");
        file.deployments
            .push(DeploymentRecord::verifier(self.verifier, self.parties.buyer, self.verifier_tx));
        file.deployments.push(DeploymentRecord::escrow(
            self.escrow,
            self.parties.buyer,
            self.parties.seller,
            self.escrow_tx,
            self.timeout,
            LinkedContracts {
                condition_verifier: self.verifier,
                external_condition_id: self.condition_id,
                beneficiary: self.parties.beneficiary,
                required_amount: self.required_amount,
            },
        ));
        file
    }

    pub fn registry(&self) -> Registry {
        Registry::from_file(&self.deployment_file())
    }
}

fn deployed(receipt: &Receipt) -> Result<Address, LedgerError> {
    receipt
        .contract_address
        .ok_or_else(|| LedgerError::UnexpectedResponse("deployment receipt without contract address".into()))
}
