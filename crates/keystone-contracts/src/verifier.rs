use std::collections::BTreeMap;

use keystone_core::{Address, Timestamp, Wei};
use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::error::ContractError;
use crate::events::VerifierEvent;
use crate::traits::ConditionGate;

/// Kind of external condition. Only ETH deposit thresholds exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    EthDeposit,
}

/// A condition record held by the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCondition {
    pub condition_id: u64,
    pub condition_type: ConditionType,
    /// Account that created the condition.
    pub creator: Address,
    /// Receives the forwarded deposits once the threshold is met.
    pub beneficiary: Address,
    pub required_amount: Wei,
    /// Cumulative deposits; reset to zero is never observed.
    pub received_amount: Wei,
    /// Monotonic: once true, stays true.
    pub fulfilled: bool,
    /// Reserved; no operation sets it.
    pub disputed: bool,
    pub created_at: Timestamp,
    pub fulfilled_at: Option<Timestamp>,
}

/// Calls accepted by a verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum VerifierCall {
    CreateEthDepositCondition { beneficiary: Address, required_amount: Wei },
    DepositEth { condition_id: u64 },
}

impl VerifierCall {
    pub fn is_payable(&self) -> bool {
        matches!(self, Self::DepositEth { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateEthDepositCondition { .. } => "create_eth_deposit_condition",
            Self::DepositEth { .. } => "deposit_eth",
        }
    }
}

/// Shared registry of external deposit-threshold conditions.
///
/// Condition ids are assigned sequentially from 1. Deposits accumulate
/// until the required amount is reached, at which point the whole
/// received amount is forwarded to the beneficiary in the same call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionVerifier {
    address: Address,
    next_condition_id: u64,
    conditions: BTreeMap<u64, ExternalCondition>,
}

impl ConditionVerifier {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            next_condition_id: 1,
            conditions: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Execute a call against this verifier.
    pub fn dispatch(&mut self, call: VerifierCall, ctx: &mut CallContext<'_>) -> Result<(), ContractError> {
        match call {
            VerifierCall::CreateEthDepositCondition {
                beneficiary,
                required_amount,
            } => self
                .create_eth_deposit_condition(ctx, beneficiary, required_amount)
                .map(|_| ()),
            VerifierCall::DepositEth { condition_id } => self.deposit_eth(ctx, condition_id),
        }
    }

    /// Register a new deposit-threshold condition. Returns its id.
    pub fn create_eth_deposit_condition(
        &mut self,
        ctx: &mut CallContext<'_>,
        beneficiary: Address,
        required_amount: Wei,
    ) -> Result<u64, ContractError> {
        if required_amount.is_zero() {
            return Err(ContractError::InvalidValue("required amount must be positive".into()));
        }
        if beneficiary.is_zero() {
            return Err(ContractError::InvalidValue("beneficiary cannot be the zero address".into()));
        }

        let condition_id = self.next_condition_id;
        let condition = ExternalCondition {
            condition_id,
            condition_type: ConditionType::EthDeposit,
            creator: ctx.sender,
            beneficiary,
            required_amount,
            received_amount: Wei::ZERO,
            fulfilled: false,
            disputed: false,
            created_at: ctx.timestamp,
            fulfilled_at: None,
        };
        self.conditions.insert(condition_id, condition);
        self.next_condition_id += 1;

        tracing::info!(
            verifier = %self.address,
            condition_id,
            creator = %ctx.sender,
            beneficiary = %beneficiary,
            required = %required_amount,
            "external condition created"
        );

        ctx.emit(VerifierEvent::ConditionCreated {
            condition_id,
            creator: ctx.sender,
            beneficiary,
            required_amount,
        });
        Ok(condition_id)
    }

    /// Deposit the attached value toward a condition.
    pub fn deposit_eth(&mut self, ctx: &mut CallContext<'_>, condition_id: u64) -> Result<(), ContractError> {
        let condition = self
            .conditions
            .get(&condition_id)
            .ok_or(ContractError::UnknownCondition(condition_id))?;
        if condition.fulfilled {
            return Err(ContractError::AlreadyFulfilled(condition_id));
        }
        if ctx.value.is_zero() {
            return Err(ContractError::InvalidValue("deposit must carry value".into()));
        }

        let received = condition.received_amount.checked_add(ctx.value)?;
        let beneficiary = condition.beneficiary;
        let reached = received >= condition.required_amount;

        // Forward before recording fulfilment so a failed transfer aborts cleanly.
        if reached {
            ctx.pay(&beneficiary, received)?;
        }

        let timestamp = ctx.timestamp;
        let condition = self
            .conditions
            .get_mut(&condition_id)
            .ok_or(ContractError::UnknownCondition(condition_id))?;
        condition.received_amount = received;

        if !reached {
            tracing::debug!(
                condition_id,
                received = %received,
                required = %condition.required_amount,
                "deposit recorded"
            );
            return Ok(());
        }

        condition.fulfilled = true;
        condition.fulfilled_at = Some(timestamp);

        tracing::info!(
            verifier = %self.address,
            condition_id,
            beneficiary = %beneficiary,
            amount = %received,
            "external condition fulfilled, deposit forwarded"
        );

        ctx.emit(VerifierEvent::ConditionFulfilled { condition_id });
        ctx.emit(VerifierEvent::EthForwarded {
            beneficiary,
            amount: received,
        });
        Ok(())
    }

    /// Whether the condition is fulfilled. Unknown ids are not fulfilled.
    pub fn is_condition_fulfilled(&self, condition_id: u64) -> bool {
        self.conditions
            .get(&condition_id)
            .map(|c| c.fulfilled)
            .unwrap_or(false)
    }

    /// True iff the condition exists, is fulfilled, and was created by and for
    /// exactly the given parties.
    pub fn verify_condition_for_parties(
        &self,
        condition_id: u64,
        expected_creator: &Address,
        expected_beneficiary: &Address,
    ) -> bool {
        self.conditions.get(&condition_id).is_some_and(|c| {
            c.fulfilled && c.creator == *expected_creator && c.beneficiary == *expected_beneficiary
        })
    }

    pub fn get_condition_details(&self, condition_id: u64) -> Result<&ExternalCondition, ContractError> {
        self.conditions
            .get(&condition_id)
            .ok_or(ContractError::UnknownCondition(condition_id))
    }

    /// Number of conditions ever created.
    pub fn condition_count(&self) -> u64 {
        self.conditions.len() as u64
    }

    pub fn conditions(&self) -> impl Iterator<Item = &ExternalCondition> {
        self.conditions.values()
    }
}

impl ConditionGate for ConditionVerifier {
    fn verify_condition_for_parties(
        &self,
        verifier: &Address,
        condition_id: u64,
        expected_creator: &Address,
        expected_beneficiary: &Address,
    ) -> bool {
        *verifier == self.address
            && ConditionVerifier::verify_condition_for_parties(self, condition_id, expected_creator, expected_beneficiary)
    }
}
