//! Persistent store contract for accounting entities.
//!
//! The store is the durable backend the caching session writes back to. It
//! is not assumed to read back its own writes within a unit of work, and any
//! call may fail with a transient backend error.

mod memory;
mod sqlite;

pub use memory::{MemoryStore, StoreStats};
pub use sqlite::SqliteStore;

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::accounting::{AccountMovement, Deposit, ParticipantAccount};

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("no such {kind}: {key}")]
  NotFound { kind: &'static str, key: String },

  #[error("movement key not set")]
  KeyNotSet,

  /// Contract breach by the caller. The current operation must not continue.
  #[error("precondition violated: {0}")]
  Precondition(String),

  #[error("backend unavailable: {0}")]
  Unavailable(String),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to encode or decode entity: {0}")]
  Codec(#[from] serde_json::Error),
}

impl StoreError {
  pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
    Self::NotFound {
      kind,
      key: key.into(),
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::NotFound { .. })
  }

  /// Whether the error signals a programming error rather than a runtime
  /// condition.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::Precondition(_))
  }

  /// Whether repeating the same call may succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Unavailable(_) => true,
      Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
        matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
      }
      _ => false,
    }
  }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read/write access to accounts, movements and deposits.
///
/// Implemented by the durable backends and by
/// [`CachingSession`](crate::cache::CachingSession), so accounting logic can
/// run against either.
pub trait AccountingStore {
  fn get_account(&mut self, participant: &str) -> StoreResult<ParticipantAccount>;
  fn save_account(&mut self, account: &ParticipantAccount) -> StoreResult<()>;

  fn get_movement(&mut self, key: &str) -> StoreResult<AccountMovement>;
  fn save_movement(&mut self, movement: &AccountMovement) -> StoreResult<()>;

  /// Allocate a fresh key for a movement of `participant`.
  fn new_movement_key(&mut self, participant: &str) -> StoreResult<String>;

  fn get_deposit(&mut self, uid: &str) -> StoreResult<Deposit>;
  fn save_deposit(&mut self, uid: &str, deposit: &Deposit) -> StoreResult<()>;
}
