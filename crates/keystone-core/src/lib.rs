pub mod error;
pub mod limits;
pub mod state_machine;
pub mod types;

pub use error::CoreError;
pub use limits::{MAX_CONDITIONS, MAX_DESCRIPTION_LEN};
pub use state_machine::{EscrowAction, EscrowState, EscrowStateMachine};
pub use types::{Address, BlockNumber, Timestamp, TxHash, Wei};
