//! Protocol-wide limits shared by contracts and tooling.

/// Maximum number of internal conditions a single escrow may carry.
pub const MAX_CONDITIONS: usize = 10;

/// Maximum length, in bytes, of an internal condition description.
pub const MAX_DESCRIPTION_LEN: usize = 100;
