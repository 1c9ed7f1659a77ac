use keystone_core::Address;

/// Read-only view of external conditions, as seen by an escrow during release.
///
/// A verifier that does not exist, or a condition id it does not know,
/// verifies as `false`.
pub trait ConditionGate {
    fn verify_condition_for_parties(
        &self,
        verifier: &Address,
        condition_id: u64,
        expected_creator: &Address,
        expected_beneficiary: &Address,
    ) -> bool;
}
