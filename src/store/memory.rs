//! In-memory store backed by hash maps.

use std::collections::HashMap;

use super::{AccountingStore, StoreError, StoreResult};
use crate::accounting::{AccountMovement, Deposit, ParticipantAccount};
use crate::cache::Cacheable;

/// Counters of calls that reached the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
  pub reads: usize,
  pub writes: usize,
  pub keys_allocated: usize,
}

/// Store that keeps everything in process memory.
///
/// Reads are served from the committed maps only, and every call is counted
/// so callers can tell which operations actually reached the backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
  accounts: HashMap<String, ParticipantAccount>,
  movements: HashMap<String, AccountMovement>,
  deposits: HashMap<String, Deposit>,
  next_key: u64,
  stats: StoreStats,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn stats(&self) -> StoreStats {
    self.stats
  }

  /// Peek at a stored account without counting a read.
  pub fn account(&self, participant: &str) -> Option<&ParticipantAccount> {
    self.accounts.get(participant)
  }

  pub fn movement(&self, key: &str) -> Option<&AccountMovement> {
    self.movements.get(key)
  }

  pub fn deposit(&self, uid: &str) -> Option<&Deposit> {
    self.deposits.get(uid)
  }

  /// Insert a movement under an arbitrary storage key, bypassing the
  /// movement's own key field.
  pub fn insert_raw_movement(&mut self, key: impl Into<String>, movement: AccountMovement) {
    self.movements.insert(key.into(), movement);
  }
}

fn lookup<T: Cacheable>(map: &HashMap<String, T>, key: &str) -> StoreResult<T> {
  map
    .get(key)
    .cloned()
    .ok_or_else(|| StoreError::not_found(T::entity_type(), key))
}

impl AccountingStore for MemoryStore {
  fn get_account(&mut self, participant: &str) -> StoreResult<ParticipantAccount> {
    self.stats.reads += 1;
    lookup(&self.accounts, participant)
  }

  fn save_account(&mut self, account: &ParticipantAccount) -> StoreResult<()> {
    if account.participant.is_empty() {
      return Err(StoreError::Precondition(
        "account has no participant".to_string(),
      ));
    }
    self.stats.writes += 1;
    self
      .accounts
      .insert(account.participant.clone(), account.clone());
    Ok(())
  }

  fn get_movement(&mut self, key: &str) -> StoreResult<AccountMovement> {
    self.stats.reads += 1;
    lookup(&self.movements, key)
  }

  fn save_movement(&mut self, movement: &AccountMovement) -> StoreResult<()> {
    let key = movement.key.clone().ok_or(StoreError::KeyNotSet)?;
    self.stats.writes += 1;
    self.movements.insert(key, movement.clone());
    Ok(())
  }

  fn new_movement_key(&mut self, _participant: &str) -> StoreResult<String> {
    self.next_key += 1;
    self.stats.keys_allocated += 1;
    Ok(format!("m{}", self.next_key))
  }

  fn get_deposit(&mut self, uid: &str) -> StoreResult<Deposit> {
    self.stats.reads += 1;
    lookup(&self.deposits, uid)
  }

  fn save_deposit(&mut self, uid: &str, deposit: &Deposit) -> StoreResult<()> {
    self.stats.writes += 1;
    self.deposits.insert(uid.to_string(), deposit.clone());
    Ok(())
  }
}
