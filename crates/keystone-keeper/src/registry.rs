//! Deployment registry.
//!
//! Reads the deployment record file written by the deploy tooling and
//! indexes escrows by the external condition they are linked to.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use keystone_core::{Address, TxHash, Wei};
use serde::{Deserialize, Serialize};

use crate::error::KeeperError;

pub const ESCROW_CONTRACT: &str = "Escrow";
pub const VERIFIER_CONTRACT: &str = "ConditionVerifier";

/// The deployment record file: `{"network": ..., "deployments": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentFile {
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub deployments: Vec<DeploymentRecord>,
}

/// One deployed contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract: String,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller: Option<Address>,
    /// RFC 3339, UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub constructor_args: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_contracts: Option<LinkedContracts>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedContracts {
    pub condition_verifier: Address,
    pub external_condition_id: u64,
    pub beneficiary: Address,
    pub required_amount: Wei,
}

impl DeploymentRecord {
    pub fn verifier(address: Address, deployer: Address, tx_hash: TxHash) -> Self {
        Self {
            contract: VERIFIER_CONTRACT.into(),
            address,
            tx_hash: Some(tx_hash),
            deployer: Some(deployer),
            seller: None,
            timestamp: Some(now_rfc3339()),
            constructor_args: Vec::new(),
            linked_contracts: None,
        }
    }

    pub fn escrow(
        address: Address,
        deployer: Address,
        seller: Address,
        tx_hash: TxHash,
        timeout: u64,
        linked: LinkedContracts,
    ) -> Self {
        let constructor_args = vec![
            serde_json::json!(seller),
            serde_json::json!(timeout),
            serde_json::json!(linked.condition_verifier),
            serde_json::json!(linked.external_condition_id),
            serde_json::json!(linked.beneficiary),
        ];
        Self {
            contract: ESCROW_CONTRACT.into(),
            address,
            tx_hash: Some(tx_hash),
            deployer: Some(deployer),
            seller: Some(seller),
            timestamp: Some(now_rfc3339()),
            constructor_args,
            linked_contracts: Some(linked),
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl DeploymentFile {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            deployments: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, KeeperError> {
        let contents = std::fs::read_to_string(path).map_err(|source| KeeperError::DeploymentsIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| KeeperError::DeploymentsFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), KeeperError> {
        let io_err = |source| KeeperError::DeploymentsIo {
            path: path.to_path_buf(),
            source,
        };
        let contents = serde_json::to_string_pretty(self).map_err(|source| KeeperError::DeploymentsFormat {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, contents).map_err(io_err)
    }
}

/// An escrow the keeper may settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowEntry {
    pub address: Address,
    pub seller: Address,
    pub verifier: Address,
    pub condition_id: u64,
    pub beneficiary: Address,
    pub required_amount: Wei,
}

/// Escrows indexed by their linked external condition.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    network: String,
    escrows: Vec<EscrowEntry>,
    verifiers: Vec<Address>,
}

impl Registry {
    pub fn load(path: &Path) -> Result<Self, KeeperError> {
        let file = DeploymentFile::load(path)?;
        let registry = Self::from_file(&file);
        tracing::info!(
            path = %path.display(),
            network = %registry.network,
            escrows = registry.escrows.len(),
            verifiers = registry.verifiers.len(),
            "deployment registry loaded"
        );
        Ok(registry)
    }

    pub fn from_file(file: &DeploymentFile) -> Self {
        let mut registry = Registry {
            network: file.network.clone(),
            ..Default::default()
        };
        for record in &file.deployments {
            match record.contract.as_str() {
                VERIFIER_CONTRACT => registry.add_verifier(record.address),
                ESCROW_CONTRACT => {
                    let (Some(linked), Some(seller)) = (&record.linked_contracts, record.seller) else {
                        tracing::warn!(
                            escrow = %record.address,
                            "escrow record has no linked condition or seller, skipping"
                        );
                        continue;
                    };
                    registry.add_verifier(linked.condition_verifier);
                    registry.escrows.push(EscrowEntry {
                        address: record.address,
                        seller,
                        verifier: linked.condition_verifier,
                        condition_id: linked.external_condition_id,
                        beneficiary: linked.beneficiary,
                        required_amount: linked.required_amount,
                    });
                }
                other => tracing::debug!(contract = other, address = %record.address, "ignoring deployment record"),
            }
        }
        registry
    }

    fn add_verifier(&mut self, address: Address) {
        if !self.verifiers.contains(&address) {
            self.verifiers.push(address);
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn escrows(&self) -> &[EscrowEntry] {
        &self.escrows
    }

    /// Every verifier the keeper should watch.
    pub fn verifier_addresses(&self) -> &[Address] {
        &self.verifiers
    }

    /// Escrows linked to `condition_id` on `verifier`.
    pub fn matching(&self, verifier: Address, condition_id: u64) -> impl Iterator<Item = &EscrowEntry> {
        self.escrows
            .iter()
            .filter(move |e| e.verifier == verifier && e.condition_id == condition_id)
    }
}
