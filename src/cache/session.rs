//! Write-back caching session over an accounting store.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::entity::EntityCache;
use super::traits::Cacheable;
use crate::accounting::{AccountMovement, Deposit, ParticipantAccount};
use crate::store::{AccountingStore, StoreError, StoreResult};

/// Number of entities written back by one [`CachingSession::flush`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
  pub accounts: usize,
  pub deposits: usize,
  pub movements: usize,
}

impl FlushStats {
  pub fn total(&self) -> usize {
    self.accounts + self.deposits + self.movements
  }
}

/// Bounded retry for [`CachingSession::flush_with_retry`].
///
/// The wait before attempt `n + 1` is `backoff * n`. A zero backoff retries
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRetry {
  pub max_attempts: u32,
  pub backoff: Duration,
}

impl FlushRetry {
  pub fn new(max_attempts: u32) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      backoff: Duration::from_millis(100),
    }
  }

  pub fn with_backoff(mut self, backoff: Duration) -> Self {
    self.backoff = backoff;
    self
  }
}

impl Default for FlushRetry {
  fn default() -> Self {
    Self::new(3)
  }
}

/// Caching view of an [`AccountingStore`] for one unit of work.
///
/// Reads are answered from the session once a value has been read or
/// written, so the unit of work always sees its own writes even when the
/// backend doesn't. Writes stay in the session until [`flush`](Self::flush).
///
/// The session is single-threaded and meant to be dropped after the final
/// flush. Run one session per worker if units of work execute in parallel.
pub struct CachingSession<'a, S: AccountingStore + ?Sized> {
  store: &'a mut S,
  accounts: EntityCache<ParticipantAccount>,
  deposits: EntityCache<Deposit>,
  movements: EntityCache<AccountMovement>,
}

impl<'a, S: AccountingStore + ?Sized> CachingSession<'a, S> {
  pub fn new(store: &'a mut S) -> Self {
    Self {
      store,
      accounts: EntityCache::new(),
      deposits: EntityCache::new(),
      movements: EntityCache::new(),
    }
  }

  /// The underlying store.
  pub fn delegate(&self) -> &S {
    &*self.store
  }

  /// Number of cached entities not yet written back.
  pub fn pending_writes(&self) -> usize {
    self.accounts.dirty_len() + self.deposits.dirty_len() + self.movements.dirty_len()
  }

  pub fn has_pending_writes(&self) -> bool {
    self.pending_writes() > 0
  }

  /// Write every dirty entity back to the store.
  ///
  /// Accounts go first, then deposits, then movements. Each entity is marked
  /// clean right after its own save succeeds. The first failing save aborts
  /// the flush and leaves everything not yet written dirty, so calling
  /// `flush` again picks up where the failed call stopped.
  pub fn flush(&mut self) -> StoreResult<FlushStats> {
    let store = &mut *self.store;
    let mut stats = FlushStats::default();

    stats.accounts = write_back(&mut self.accounts, |_, account| {
      store.save_account(account)
    })?;
    stats.deposits = write_back(&mut self.deposits, |uid, deposit| {
      store.save_deposit(uid, deposit)
    })?;
    stats.movements = write_back(&mut self.movements, |_, movement| {
      store.save_movement(movement)
    })?;

    if stats.total() > 0 {
      info!(
        accounts = stats.accounts,
        deposits = stats.deposits,
        movements = stats.movements,
        "flushed session"
      );
    }
    Ok(stats)
  }

  /// [`flush`](Self::flush), repeated on retryable store errors.
  ///
  /// Every attempt resumes with whatever is still dirty, so entities written
  /// by a failed attempt are not saved twice. Non-retryable errors and the
  /// error of the last allowed attempt are returned with the remaining writes
  /// still pending. The returned stats cover the successful attempt only.
  pub fn flush_with_retry(&mut self, retry: &FlushRetry) -> StoreResult<FlushStats> {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
      match self.flush() {
        Ok(stats) => return Ok(stats),
        Err(e) if e.is_retryable() && attempt < max_attempts => {
          warn!(
            attempt,
            pending = self.pending_writes(),
            error = %e,
            "flush failed, retrying"
          );
          if !retry.backoff.is_zero() {
            std::thread::sleep(retry.backoff * attempt);
          }
          attempt += 1;
        }
        Err(e) => {
          warn!(
            attempt,
            pending = self.pending_writes(),
            error = %e,
            "giving up on flush"
          );
          return Err(e);
        }
      }
    }
  }
}

/// Save each dirty entry of `cache`, marking it clean as soon as its save
/// succeeds.
fn write_back<T, F>(cache: &mut EntityCache<T>, mut save: F) -> StoreResult<usize>
where
  T: Cacheable,
  F: FnMut(&str, &T) -> StoreResult<()>,
{
  let mut written = 0;
  for (key, value) in cache.drain_dirty() {
    if let Err(e) = save(&key, &value) {
      warn!(
        kind = T::entity_type(),
        key = %key,
        remaining = cache.dirty_len(),
        error = %e,
        "write back failed"
      );
      return Err(e);
    }
    cache.mark_clean(&key);
    debug!(kind = T::entity_type(), key = %key, "written back");
    written += 1;
  }
  Ok(written)
}

impl<S: AccountingStore + ?Sized> AccountingStore for CachingSession<'_, S> {
  fn get_account(&mut self, participant: &str) -> StoreResult<ParticipantAccount> {
    let store = &mut *self.store;
    self.accounts.get(participant, |k| store.get_account(k))
  }

  fn save_account(&mut self, account: &ParticipantAccount) -> StoreResult<()> {
    if account.participant.is_empty() {
      return Err(StoreError::Precondition(format!(
        "can't save account without participant: {:?}",
        account
      )));
    }
    self
      .accounts
      .put(account.participant.clone(), account.clone());
    Ok(())
  }

  fn get_movement(&mut self, key: &str) -> StoreResult<AccountMovement> {
    let store = &mut *self.store;
    // The cached movement must report the key it is cached under
    self.movements.get_with(
      key,
      |k| store.get_movement(k),
      |movement| movement.key = Some(key.to_string()),
    )
  }

  fn save_movement(&mut self, movement: &AccountMovement) -> StoreResult<()> {
    let key = movement.key.clone().ok_or(StoreError::KeyNotSet)?;
    self.movements.put(key, movement.clone());
    Ok(())
  }

  fn new_movement_key(&mut self, participant: &str) -> StoreResult<String> {
    self.store.new_movement_key(participant)
  }

  fn get_deposit(&mut self, uid: &str) -> StoreResult<Deposit> {
    let store = &mut *self.store;
    self.deposits.get(uid, |k| store.get_deposit(k))
  }

  fn save_deposit(&mut self, uid: &str, deposit: &Deposit) -> StoreResult<()> {
    self.deposits.put(uid, deposit.clone());
    Ok(())
  }
}
