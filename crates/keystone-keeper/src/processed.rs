use dashmap::DashSet;
use keystone_core::Address;

/// External conditions the keeper has already acted on, keyed by
/// `(verifier, condition_id)`.
///
/// Lives for the keeper's process lifetime only. A restarted keeper starts
/// empty and relies on its cursor starting at the chain tip.
#[derive(Debug, Default)]
pub struct ProcessedConditions {
    seen: DashSet<(Address, u64)>,
}

impl ProcessedConditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a condition. Returns `false` if it was already recorded.
    pub fn mark(&self, verifier: Address, condition_id: u64) -> bool {
        self.seen.insert((verifier, condition_id))
    }

    pub fn contains(&self, verifier: Address, condition_id: u64) -> bool {
        self.seen.contains(&(verifier, condition_id))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
