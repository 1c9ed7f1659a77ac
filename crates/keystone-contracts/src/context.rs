use keystone_core::{Address, Timestamp, Wei};

use crate::error::ContractError;
use crate::events::ContractEvent;

/// Balance access a contract needs while executing.
///
/// Implemented by the ledger. Value attached to a call is credited to the
/// contract before execution begins.
pub trait ValueLedger {
    /// Current balance of an account or contract.
    fn balance(&self, address: &Address) -> Wei;

    /// Move `amount` from `from` to `to`.
    fn transfer(&mut self, from: &Address, to: &Address, amount: Wei) -> Result<(), ContractError>;
}

/// Execution context for a single contract call.
pub struct CallContext<'a> {
    /// The account that sent the transaction.
    pub sender: Address,
    /// Value attached to the call.
    pub value: Wei,
    /// Ledger time of the block executing the call.
    pub timestamp: Timestamp,
    /// Address of the contract being executed.
    pub this: Address,
    bank: &'a mut dyn ValueLedger,
    events: Vec<ContractEvent>,
}

impl<'a> CallContext<'a> {
    pub fn new(
        sender: Address,
        value: Wei,
        timestamp: Timestamp,
        this: Address,
        bank: &'a mut dyn ValueLedger,
    ) -> Self {
        Self {
            sender,
            value,
            timestamp,
            this,
            bank,
            events: Vec::new(),
        }
    }

    /// Balance held by the executing contract.
    pub fn self_balance(&self) -> Wei {
        self.bank.balance(&self.this)
    }

    /// Pay `amount` out of the executing contract to `to`.
    pub fn pay(&mut self, to: &Address, amount: Wei) -> Result<(), ContractError> {
        let this = self.this;
        self.bank.transfer(&this, to, amount)
    }

    /// Record an event. Events are only published if the call succeeds.
    pub fn emit(&mut self, event: impl Into<ContractEvent>) {
        self.events.push(event.into());
    }

    pub fn events(&self) -> &[ContractEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ContractEvent> {
        self.events
    }
}
