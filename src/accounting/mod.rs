//! Marketplace accounting: entities and the operations that book them.

pub mod ledger;
mod types;

pub use ledger::{LedgerError, LedgerResult};
pub use types::{AccountMovement, Deposit, Money, MovementKind, ParticipantAccount};
