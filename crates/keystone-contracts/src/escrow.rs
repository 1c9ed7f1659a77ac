use keystone_core::{
    Address, EscrowAction, EscrowState, EscrowStateMachine, Timestamp, Wei, MAX_CONDITIONS,
    MAX_DESCRIPTION_LEN,
};
use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::error::ContractError;
use crate::events::EscrowEvent;
use crate::traits::ConditionGate;

/// A buyer-defined milestone that only the seller can mark fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalCondition {
    pub description: String,
    pub fulfilled: bool,
}

/// The verifier condition an escrow is bound to at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalConditionLink {
    pub verifier: Address,
    pub condition_id: u64,
    pub beneficiary: Address,
}

/// Constructor parameters. The deployer becomes the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowParams {
    pub seller: Address,
    /// Seconds after the deposit before a refund becomes possible.
    pub timeout: u64,
    pub verifier: Address,
    pub condition_id: u64,
    pub beneficiary: Address,
}

/// Calls accepted by an escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum EscrowCall {
    Deposit,
    AddConditions { description: String },
    FulfillCondition { index: u64 },
    Release,
    Refund,
}

impl EscrowCall {
    pub fn is_payable(&self) -> bool {
        matches!(self, Self::Deposit)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::AddConditions { .. } => "add_conditions",
            Self::FulfillCondition { .. } => "fulfill_condition",
            Self::Release => "release",
            Self::Refund => "refund",
        }
    }
}

/// Aggregate view returned by `get_escrow_summary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowSummary {
    pub buyer: Address,
    pub seller: Address,
    pub amount: Wei,
    pub start: Timestamp,
    pub timeout: u64,
    pub state: EscrowState,
    pub condition_count: u64,
    pub all_conditions_fulfilled: bool,
}

/// A single-deposit escrow between a buyer and a seller.
///
/// Funds move to the seller only when every internal condition is fulfilled
/// and the linked external condition verifies for `(buyer, beneficiary)`.
/// Otherwise the buyer can reclaim them once the timeout has strictly elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    address: Address,
    buyer: Address,
    seller: Address,
    amount: Wei,
    start: Timestamp,
    timeout: u64,
    state: EscrowState,
    conditions: Vec<InternalCondition>,
    external: ExternalConditionLink,
}

impl Escrow {
    /// Construct an escrow deployed by `buyer` at `address`.
    pub fn new(address: Address, buyer: Address, params: EscrowParams) -> Result<Self, ContractError> {
        if params.seller.is_zero() {
            return Err(ContractError::InvalidValue("seller cannot be the zero address".into()));
        }
        if params.seller == buyer {
            return Err(ContractError::InvalidValue("seller and buyer must differ".into()));
        }
        if params.verifier.is_zero() {
            return Err(ContractError::InvalidValue("verifier cannot be the zero address".into()));
        }
        if params.beneficiary.is_zero() {
            return Err(ContractError::InvalidValue("beneficiary cannot be the zero address".into()));
        }
        if params.timeout == 0 {
            return Err(ContractError::InvalidValue("timeout must be positive".into()));
        }

        tracing::info!(
            escrow = %address,
            buyer = %buyer,
            seller = %params.seller,
            verifier = %params.verifier,
            condition_id = params.condition_id,
            timeout = params.timeout,
            "escrow deployed"
        );

        Ok(Self {
            address,
            buyer,
            seller: params.seller,
            amount: Wei::ZERO,
            start: 0,
            timeout: params.timeout,
            state: EscrowState::Init,
            conditions: Vec::new(),
            external: ExternalConditionLink {
                verifier: params.verifier,
                condition_id: params.condition_id,
                beneficiary: params.beneficiary,
            },
        })
    }

    /// Execute a call against this escrow.
    pub fn dispatch(
        &mut self,
        call: EscrowCall,
        ctx: &mut CallContext<'_>,
        gate: &dyn ConditionGate,
    ) -> Result<(), ContractError> {
        match call {
            EscrowCall::Deposit => self.deposit(ctx),
            EscrowCall::AddConditions { description } => self.add_conditions(ctx, description),
            EscrowCall::FulfillCondition { index } => self.fulfill_condition(ctx, index),
            EscrowCall::Release => self.release(ctx, gate),
            EscrowCall::Refund => self.refund(ctx, gate),
        }
    }

    fn require_buyer(&self, ctx: &CallContext<'_>, operation: &str) -> Result<(), ContractError> {
        if ctx.sender != self.buyer {
            return Err(ContractError::Unauthorized(format!("only the buyer can {operation}")));
        }
        Ok(())
    }

    fn require_seller(&self, ctx: &CallContext<'_>, operation: &str) -> Result<(), ContractError> {
        if ctx.sender != self.seller {
            return Err(ContractError::Unauthorized(format!("only the seller can {operation}")));
        }
        Ok(())
    }

    /// Lock the attached value. Buyer only, exactly once.
    pub fn deposit(&mut self, ctx: &mut CallContext<'_>) -> Result<(), ContractError> {
        let next = EscrowStateMachine::transition(self.state, EscrowAction::Deposit)?;
        self.require_buyer(ctx, "deposit")?;
        if ctx.value.is_zero() {
            return Err(ContractError::InvalidValue("deposit must carry value".into()));
        }

        self.amount = ctx.value;
        self.start = ctx.timestamp;
        self.state = next;

        tracing::info!(escrow = %self.address, amount = %self.amount, start = self.start, "escrow funded");
        ctx.emit(EscrowEvent::Deposited {
            buyer: self.buyer,
            amount: self.amount,
        });
        Ok(())
    }

    /// Append an internal milestone. Buyer only, while funded.
    pub fn add_conditions(&mut self, ctx: &mut CallContext<'_>, description: String) -> Result<(), ContractError> {
        self.require_buyer(ctx, "add conditions")?;
        if self.state != EscrowState::Funded {
            return Err(ContractError::InvalidState(format!(
                "conditions can only be added while Funded, escrow is {}",
                self.state
            )));
        }
        if self.conditions.len() >= MAX_CONDITIONS {
            return Err(ContractError::CapacityExceeded(MAX_CONDITIONS));
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(ContractError::InvalidValue(format!(
                "description is {} bytes, limit is {}",
                description.len(),
                MAX_DESCRIPTION_LEN
            )));
        }

        let index = self.conditions.len() as u64;
        self.conditions.push(InternalCondition {
            description: description.clone(),
            fulfilled: false,
        });

        tracing::debug!(escrow = %self.address, index, "condition added");
        ctx.emit(EscrowEvent::ConditionAdded { index, description });
        Ok(())
    }

    /// Mark a milestone fulfilled. Seller only; irreversible.
    pub fn fulfill_condition(&mut self, ctx: &mut CallContext<'_>, index: u64) -> Result<(), ContractError> {
        self.require_seller(ctx, "fulfill conditions")?;
        let count = self.conditions.len() as u64;
        let condition = usize::try_from(index)
            .ok()
            .and_then(|i| self.conditions.get_mut(i))
            .ok_or(ContractError::IndexOutOfRange { index, count })?;
        if condition.fulfilled {
            return Err(ContractError::AlreadyFulfilled(index));
        }
        condition.fulfilled = true;

        tracing::debug!(escrow = %self.address, index, "condition fulfilled");
        ctx.emit(EscrowEvent::ConditionFulfilled { index });
        Ok(())
    }

    /// Pay the deposit to the seller. Seller only, gated on every condition.
    pub fn release(&mut self, ctx: &mut CallContext<'_>, gate: &dyn ConditionGate) -> Result<(), ContractError> {
        self.require_seller(ctx, "release")?;
        let next = EscrowStateMachine::transition(self.state, EscrowAction::Release)?;

        let pending = self.pending_conditions();
        if !pending.is_empty() {
            return Err(ContractError::ConditionsNotMet(format!(
                "internal conditions pending: {pending:?}"
            )));
        }
        if !self.external_condition_verified(gate) {
            return Err(ContractError::ConditionsNotMet(format!(
                "external condition {} on {} not verified for buyer {} and beneficiary {}",
                self.external.condition_id, self.external.verifier, self.buyer, self.external.beneficiary
            )));
        }

        let amount = self.amount;
        ctx.pay(&self.seller, amount)?;
        self.amount = Wei::ZERO;
        self.state = next;

        tracing::info!(escrow = %self.address, seller = %self.seller, amount = %amount, "escrow released");
        ctx.emit(EscrowEvent::Released {
            seller: self.seller,
            amount,
        });
        Ok(())
    }

    /// Return the deposit to the buyer once the timeout has strictly elapsed
    /// and the escrow is not releasable.
    pub fn refund(&mut self, ctx: &mut CallContext<'_>, gate: &dyn ConditionGate) -> Result<(), ContractError> {
        self.require_buyer(ctx, "refund")?;
        let next = EscrowStateMachine::transition(self.state, EscrowAction::Refund)?;

        let deadline = self.deadline();
        if ctx.timestamp <= deadline {
            return Err(ContractError::TimeoutNotElapsed {
                deadline,
                now: ctx.timestamp,
            });
        }
        if self.is_releasable(gate) {
            return Err(ContractError::ConditionsNotMet(
                "refund requires at least one unmet condition".into(),
            ));
        }

        let amount = self.amount;
        ctx.pay(&self.buyer, amount)?;
        self.amount = Wei::ZERO;
        self.state = next;

        tracing::info!(escrow = %self.address, buyer = %self.buyer, amount = %amount, "escrow refunded");
        ctx.emit(EscrowEvent::Refunded {
            buyer: self.buyer,
            amount,
        });
        Ok(())
    }

    fn pending_conditions(&self) -> Vec<u64> {
        self.conditions
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.fulfilled)
            .map(|(i, _)| i as u64)
            .collect()
    }

    fn external_condition_verified(&self, gate: &dyn ConditionGate) -> bool {
        gate.verify_condition_for_parties(
            &self.external.verifier,
            self.external.condition_id,
            &self.buyer,
            &self.external.beneficiary,
        )
    }

    /// Whether both gates are currently satisfied.
    pub fn is_releasable(&self, gate: &dyn ConditionGate) -> bool {
        self.all_conditions_fulfilled() && self.external_condition_verified(gate)
    }

    /// Last instant at which a refund is still refused.
    pub fn deadline(&self) -> Timestamp {
        self.start.saturating_add(self.timeout)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn buyer(&self) -> Address {
        self.buyer
    }

    pub fn seller(&self) -> Address {
        self.seller
    }

    pub fn amount(&self) -> Wei {
        self.amount
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    pub fn state(&self) -> EscrowState {
        self.state
    }

    pub fn external_condition(&self) -> &ExternalConditionLink {
        &self.external
    }

    pub fn conditions(&self) -> &[InternalCondition] {
        &self.conditions
    }

    pub fn get_num_conditions(&self) -> u64 {
        self.conditions.len() as u64
    }

    pub fn get_condition(&self, index: u64) -> Result<(String, bool), ContractError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.conditions.get(i))
            .map(|c| (c.description.clone(), c.fulfilled))
            .ok_or(ContractError::IndexOutOfRange {
                index,
                count: self.get_num_conditions(),
            })
    }

    /// Vacuously true when there are no internal conditions.
    pub fn all_conditions_fulfilled(&self) -> bool {
        self.conditions.iter().all(|c| c.fulfilled)
    }

    pub fn get_escrow_summary(&self) -> EscrowSummary {
        EscrowSummary {
            buyer: self.buyer,
            seller: self.seller,
            amount: self.amount,
            start: self.start,
            timeout: self.timeout,
            state: self.state,
            condition_count: self.get_num_conditions(),
            all_conditions_fulfilled: self.all_conditions_fulfilled(),
        }
    }
}
