use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use keystone_contracts::{
    CallContext, ConditionGate, ConditionVerifier, ContractError, ContractEvent, Escrow, ExternalCondition,
    ValueLedger,
};
use keystone_core::{Address, BlockNumber, Timestamp, TxHash, Wei};

use crate::client::LedgerClient;
use crate::error::LedgerError;
use crate::tx::{Call, ContractKind, LogEntry, LogFilter, Receipt, RevertReason, Transaction, TxStatus};

#[derive(Debug, Clone)]
enum Contract {
    Escrow(Escrow),
    Verifier(ConditionVerifier),
}

/// Everything a transaction can change.
#[derive(Debug, Clone, Default)]
struct ChainState {
    balances: HashMap<Address, Wei>,
    nonces: HashMap<Address, u64>,
    contracts: HashMap<Address, Contract>,
    logs: Vec<LogEntry>,
    block_number: BlockNumber,
    block_timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy)]
enum Clock {
    Fixed(Timestamp),
    /// Wall-clock seconds plus an accumulated offset.
    System { offset: u64 },
}

impl Clock {
    fn now(&self) -> Timestamp {
        match self {
            Clock::Fixed(ts) => *ts,
            Clock::System { offset } => {
                let wall = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
                wall.saturating_add(*offset)
            }
        }
    }

    fn advance(&mut self, seconds: u64) {
        match self {
            Clock::Fixed(ts) => *ts = ts.saturating_add(seconds),
            Clock::System { offset } => *offset = offset.saturating_add(seconds),
        }
    }
}

struct Inner {
    state: ChainState,
    clock: Clock,
}

/// Balance access for a contract while it executes.
struct Bank<'a> {
    balances: &'a mut HashMap<Address, Wei>,
    contracts: &'a HashMap<Address, Contract>,
    /// The executing contract is out of `contracts` for the duration of the call.
    executing: Address,
}

impl ValueLedger for Bank<'_> {
    fn balance(&self, address: &Address) -> Wei {
        self.balances.get(address).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: Wei) -> Result<(), ContractError> {
        let failed = |reason: &str| ContractError::TransferFailed {
            to: *to,
            amount,
            reason: reason.to_string(),
        };
        if *to == self.executing || self.contracts.contains_key(to) {
            return Err(failed("recipient is a contract without a payable entry point"));
        }
        let remaining = self
            .balance(from)
            .checked_sub(amount)
            .ok_or_else(|| failed("insufficient contract balance"))?;
        let credited = self
            .balance(to)
            .checked_add(amount)
            .map_err(|_| failed("recipient balance overflow"))?;
        self.balances.insert(*from, remaining);
        self.balances.insert(*to, credited);
        Ok(())
    }
}

/// Read-only view of deployed verifiers for escrow gating.
struct ContractsView<'a>(&'a HashMap<Address, Contract>);

impl ConditionGate for ContractsView<'_> {
    fn verify_condition_for_parties(
        &self,
        verifier: &Address,
        condition_id: u64,
        expected_creator: &Address,
        expected_beneficiary: &Address,
    ) -> bool {
        match self.0.get(verifier) {
            Some(Contract::Verifier(v)) => {
                v.verify_condition_for_parties(condition_id, expected_creator, expected_beneficiary)
            }
            _ => false,
        }
    }
}

struct Execution {
    contract_address: Option<Address>,
    emitted: Vec<(Address, ContractEvent)>,
}

/// An in-process ledger with a single total order of transactions.
///
/// Every transaction is mined in its own block. Execution runs against a
/// working copy of the chain state which replaces the committed state only
/// if the transaction succeeds, so a reverted transaction leaves no trace
/// beyond the sender's nonce and the block height.
pub struct InMemoryLedger {
    inner: Mutex<Inner>,
}

impl InMemoryLedger {
    /// A ledger following wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Clock::System { offset: 0 })
    }

    /// A ledger whose clock only moves through `advance_time`.
    pub fn with_fixed_time(timestamp: Timestamp) -> Self {
        Self::with_clock(Clock::Fixed(timestamp))
    }

    fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ChainState::default(),
                clock,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, LedgerError> {
        self.inner
            .lock()
            .map_err(|_| LedgerError::Internal("ledger state lock poisoned".into()))
    }

    /// Credit an account out of thin air (genesis allocation).
    pub fn fund(&self, address: Address, amount: Wei) -> Result<Wei, LedgerError> {
        let mut inner = self.lock()?;
        let balance = inner.state.balances.entry(address).or_default();
        *balance = balance
            .checked_add(amount)
            .map_err(|e| LedgerError::Internal(e.to_string()))?;
        tracing::debug!(%address, amount = %amount, "account funded");
        Ok(*balance)
    }

    /// Move the ledger clock forward. Returns the new ledger time.
    pub fn advance_time(&self, seconds: u64) -> Result<Timestamp, LedgerError> {
        let mut inner = self.lock()?;
        inner.clock.advance(seconds);
        let now = inner.clock.now().max(inner.state.block_timestamp);
        tracing::debug!(seconds, now, "ledger time advanced");
        Ok(now)
    }

    /// Kind of contract deployed at `address`, if any.
    pub fn contract_kind(&self, address: &Address) -> Result<Option<ContractKind>, LedgerError> {
        let inner = self.lock()?;
        Ok(inner.state.contracts.get(address).map(|c| match c {
            Contract::Escrow(_) => ContractKind::Escrow,
            Contract::Verifier(_) => ContractKind::ConditionVerifier,
        }))
    }

    /// Account nonce: number of transactions sent, reverted ones included.
    pub fn nonce(&self, address: &Address) -> Result<u64, LedgerError> {
        let inner = self.lock()?;
        Ok(inner.state.nonces.get(address).copied().unwrap_or(0))
    }

    fn apply(&self, tx: Transaction, commit: bool) -> Result<Receipt, LedgerError> {
        let mut inner = self.lock()?;
        let Inner { state, clock } = &mut *inner;

        let nonce = state.nonces.get(&tx.from).copied().unwrap_or(0);
        let block_number = state.block_number + 1;
        let timestamp = clock.now().max(state.block_timestamp);
        let tx_hash = tx_hash(&tx, nonce, block_number)?;

        let mut working = state.clone();
        working.nonces.insert(tx.from, nonce + 1);

        let receipt = match execute(&mut working, &tx, nonce, timestamp) {
            Ok(execution) => {
                let logs: Vec<LogEntry> = execution
                    .emitted
                    .into_iter()
                    .enumerate()
                    .map(|(i, (address, event))| LogEntry {
                        address,
                        block_number,
                        tx_hash,
                        log_index: i as u64,
                        event,
                    })
                    .collect();
                working.logs.extend(logs.iter().cloned());
                Receipt {
                    tx_hash,
                    block_number,
                    from: tx.from,
                    status: TxStatus::Success,
                    contract_address: execution.contract_address,
                    logs,
                }
            }
            Err(reason) => Receipt {
                tx_hash,
                block_number,
                from: tx.from,
                status: TxStatus::Reverted(reason),
                contract_address: None,
                logs: Vec::new(),
            },
        };

        if !commit {
            tracing::debug!(call = %tx.call.describe(), success = receipt.is_success(), "transaction simulated");
            return Ok(receipt);
        }

        if receipt.is_success() {
            *state = working;
        } else {
            state.nonces.insert(tx.from, nonce + 1);
        }
        state.block_number = block_number;
        state.block_timestamp = timestamp;

        match receipt.revert_reason() {
            None => tracing::info!(
                tx = %tx_hash,
                block = block_number,
                from = %tx.from,
                call = %tx.call.describe(),
                logs = receipt.logs.len(),
                "transaction mined"
            ),
            Some(reason) => tracing::warn!(
                tx = %tx_hash,
                block = block_number,
                from = %tx.from,
                call = %tx.call.describe(),
                %reason,
                "transaction reverted"
            ),
        }
        Ok(receipt)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn tx_hash(tx: &Transaction, nonce: u64, block_number: BlockNumber) -> Result<TxHash, LedgerError> {
    let call = serde_json::to_vec(&tx.call)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"keystone/tx");
    hasher.update(tx.from.as_bytes());
    hasher.update(&nonce.to_be_bytes());
    hasher.update(&block_number.to_be_bytes());
    hasher.update(&tx.value.value().to_be_bytes());
    hasher.update(&call);
    Ok(TxHash(*hasher.finalize().as_bytes()))
}

fn move_value(state: &mut ChainState, from: &Address, to: &Address, amount: Wei) -> Result<(), RevertReason> {
    if amount.is_zero() {
        return Ok(());
    }
    let available = state.balances.get(from).copied().unwrap_or_default();
    let remaining = available.checked_sub(amount).ok_or(RevertReason::InsufficientFunds {
        required: amount,
        available,
    })?;
    let credited = state
        .balances
        .get(to)
        .copied()
        .unwrap_or_default()
        .checked_add(amount)
        .map_err(|e| RevertReason::Contract(e.into()))?;
    state.balances.insert(*from, remaining);
    state.balances.insert(*to, credited);
    Ok(())
}

fn require_no_value(tx: &Transaction, target: &str) -> Result<(), RevertReason> {
    if tx.value.is_zero() {
        Ok(())
    } else {
        Err(RevertReason::NotPayable(target.to_string()))
    }
}

fn execute(
    state: &mut ChainState,
    tx: &Transaction,
    nonce: u64,
    timestamp: Timestamp,
) -> Result<Execution, RevertReason> {
    match &tx.call {
        Call::DeployVerifier => {
            require_no_value(tx, "ConditionVerifier constructor")?;
            let address = Address::contract(&tx.from, nonce);
            state
                .contracts
                .insert(address, Contract::Verifier(ConditionVerifier::new(address)));
            Ok(Execution {
                contract_address: Some(address),
                emitted: Vec::new(),
            })
        }
        Call::DeployEscrow(params) => {
            require_no_value(tx, "Escrow constructor")?;
            let address = Address::contract(&tx.from, nonce);
            let escrow = Escrow::new(address, tx.from, params.clone()).map_err(RevertReason::Contract)?;
            state.contracts.insert(address, Contract::Escrow(escrow));
            Ok(Execution {
                contract_address: Some(address),
                emitted: Vec::new(),
            })
        }
        Call::Transfer { to } => {
            if state.contracts.contains_key(to) {
                return Err(RevertReason::NotPayable(format!("contract {to}")));
            }
            move_value(state, &tx.from, to, tx.value)?;
            Ok(Execution {
                contract_address: None,
                emitted: Vec::new(),
            })
        }
        Call::Escrow { address, call } => {
            // Removed for the duration of the call; the working copy is
            // discarded on any error, so early returns need no reinsertion.
            let mut escrow = match state.contracts.remove(address) {
                Some(Contract::Escrow(escrow)) => escrow,
                Some(_) => {
                    return Err(RevertReason::WrongContractKind {
                        address: *address,
                        expected: ContractKind::Escrow,
                    })
                }
                None => return Err(RevertReason::NoContract(*address)),
            };
            if !tx.value.is_zero() && !call.is_payable() {
                return Err(RevertReason::NotPayable(format!("Escrow.{}", call.name())));
            }
            move_value(state, &tx.from, address, tx.value)?;

            let events = {
                let ChainState {
                    balances, contracts, ..
                } = &mut *state;
                let contracts: &HashMap<Address, Contract> = contracts;
                let gate = ContractsView(contracts);
                let mut bank = Bank {
                    balances,
                    contracts,
                    executing: *address,
                };
                let mut ctx = CallContext::new(tx.from, tx.value, timestamp, *address, &mut bank);
                escrow
                    .dispatch(call.clone(), &mut ctx, &gate)
                    .map_err(RevertReason::Contract)?;
                ctx.into_events()
            };
            state.contracts.insert(*address, Contract::Escrow(escrow));
            Ok(Execution {
                contract_address: None,
                emitted: events.into_iter().map(|e| (*address, e)).collect(),
            })
        }
        Call::Verifier { address, call } => {
            let mut verifier = match state.contracts.remove(address) {
                Some(Contract::Verifier(verifier)) => verifier,
                Some(_) => {
                    return Err(RevertReason::WrongContractKind {
                        address: *address,
                        expected: ContractKind::ConditionVerifier,
                    })
                }
                None => return Err(RevertReason::NoContract(*address)),
            };
            if !tx.value.is_zero() && !call.is_payable() {
                return Err(RevertReason::NotPayable(format!("ConditionVerifier.{}", call.name())));
            }
            move_value(state, &tx.from, address, tx.value)?;

            let events = {
                let ChainState {
                    balances, contracts, ..
                } = &mut *state;
                let contracts: &HashMap<Address, Contract> = contracts;
                let mut bank = Bank {
                    balances,
                    contracts,
                    executing: *address,
                };
                let mut ctx = CallContext::new(tx.from, tx.value, timestamp, *address, &mut bank);
                verifier
                    .dispatch(call.clone(), &mut ctx)
                    .map_err(RevertReason::Contract)?;
                ctx.into_events()
            };
            state.contracts.insert(*address, Contract::Verifier(verifier));
            Ok(Execution {
                contract_address: None,
                emitted: events.into_iter().map(|e| (*address, e)).collect(),
            })
        }
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn block_number(&self) -> Result<BlockNumber, LedgerError> {
        Ok(self.lock()?.state.block_number)
    }

    async fn now(&self) -> Result<Timestamp, LedgerError> {
        let inner = self.lock()?;
        Ok(inner.clock.now().max(inner.state.block_timestamp))
    }

    async fn send_transaction(&self, tx: Transaction) -> Result<Receipt, LedgerError> {
        self.apply(tx, true)
    }

    async fn simulate(&self, tx: Transaction) -> Result<Receipt, LedgerError> {
        self.apply(tx, false)
    }

    async fn get_logs(&self, filter: LogFilter) -> Result<Vec<LogEntry>, LedgerError> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    async fn balance(&self, address: Address) -> Result<Wei, LedgerError> {
        let inner = self.lock()?;
        Ok(inner.state.balances.get(&address).copied().unwrap_or_default())
    }

    async fn escrow(&self, address: Address) -> Result<Escrow, LedgerError> {
        let inner = self.lock()?;
        match inner.state.contracts.get(&address) {
            Some(Contract::Escrow(escrow)) => Ok(escrow.clone()),
            Some(_) => Err(LedgerError::WrongContractKind {
                address,
                expected: ContractKind::Escrow,
            }),
            None => Err(LedgerError::NoContract(address)),
        }
    }

    async fn verifier_condition(&self, verifier: Address, condition_id: u64) -> Result<ExternalCondition, LedgerError> {
        let inner = self.lock()?;
        match inner.state.contracts.get(&verifier) {
            Some(Contract::Verifier(v)) => Ok(v.get_condition_details(condition_id)?.clone()),
            Some(_) => Err(LedgerError::WrongContractKind {
                address: verifier,
                expected: ContractKind::ConditionVerifier,
            }),
            None => Err(LedgerError::NoContract(verifier)),
        }
    }

    async fn verify_condition_for_parties(
        &self,
        verifier: Address,
        condition_id: u64,
        expected_creator: Address,
        expected_beneficiary: Address,
    ) -> Result<bool, LedgerError> {
        let inner = self.lock()?;
        let view = ContractsView(&inner.state.contracts);
        Ok(view.verify_condition_for_parties(&verifier, condition_id, &expected_creator, &expected_beneficiary))
    }
}
