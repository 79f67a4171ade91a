//! Accounting operations over any [`AccountingStore`].
//!
//! Each operation reads and writes several entities. Run them against a
//! [`CachingSession`](crate::cache::CachingSession) so later steps see the
//! writes of earlier ones, then flush the session once the unit of work is
//! complete.

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use super::types::{AccountMovement, Deposit, Money, MovementKind, ParticipantAccount};
use crate::store::{AccountingStore, StoreError, StoreResult};

#[derive(Debug, Error)]
pub enum LedgerError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("deposit {0} is already booked")]
  DuplicateDeposit(String),

  #[error("insufficient funds for {participant}: needs {needed}, has {available}")]
  InsufficientFunds {
    participant: String,
    needed: Money,
    available: Money,
  },

  #[error("amount must be positive, got {0}")]
  InvalidAmount(Money),

  #[error("can't transfer from {0} to itself")]
  SelfTransfer(String),

  #[error("balance of {0} would overflow")]
  Overflow(String),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Load an account, starting a fresh one if the participant has none yet.
pub fn account_or_new<S>(store: &mut S, participant: &str) -> StoreResult<ParticipantAccount>
where
  S: AccountingStore + ?Sized,
{
  match store.get_account(participant) {
    Ok(account) => Ok(account),
    Err(e) if e.is_not_found() => Ok(ParticipantAccount::new(participant)),
    Err(e) => Err(e),
  }
}

/// Credit an incoming payment identified by `uid`.
pub fn book_deposit<S>(
  store: &mut S,
  uid: &str,
  participant: &str,
  amount: Money,
  reference: Option<String>,
) -> LedgerResult<AccountMovement>
where
  S: AccountingStore + ?Sized,
{
  ensure_positive(amount)?;
  match store.get_deposit(uid) {
    Ok(_) => return Err(LedgerError::DuplicateDeposit(uid.to_string())),
    Err(e) if e.is_not_found() => {}
    Err(e) => return Err(e.into()),
  }

  let mut account = account_or_new(store, participant)?;
  let movement = book(
    store,
    &mut account,
    MovementKind::Deposit,
    amount,
    0,
    Some(uid.to_string()),
  )?;

  let deposit = Deposit {
    participant: participant.to_string(),
    amount,
    reference,
    created: Utc::now(),
  };
  store.save_deposit(uid, &deposit)?;

  info!(uid, participant, amount, "booked deposit");
  Ok(movement)
}

/// Move `amount` of available funds from one participant to another.
///
/// Returns the debit and the credit movement.
pub fn transfer<S>(
  store: &mut S,
  from: &str,
  to: &str,
  amount: Money,
  reference: Option<String>,
) -> LedgerResult<(AccountMovement, AccountMovement)>
where
  S: AccountingStore + ?Sized,
{
  ensure_positive(amount)?;
  if from == to {
    return Err(LedgerError::SelfTransfer(from.to_string()));
  }

  let mut payer = account_or_new(store, from)?;
  ensure_covers(&payer.participant, payer.available, amount)?;
  let mut payee = account_or_new(store, to)?;
  // Fail before the debit is booked so the session holds no half transfer
  if payee.available.checked_add(amount).is_none() {
    return Err(LedgerError::Overflow(payee.participant));
  }

  let debit = book(
    store,
    &mut payer,
    MovementKind::TransferOut,
    -amount,
    0,
    reference.clone(),
  )?;
  let credit = book(
    store,
    &mut payee,
    MovementKind::TransferIn,
    amount,
    0,
    reference,
  )?;

  info!(from, to, amount, "booked transfer");
  Ok((debit, credit))
}

/// Reserve available funds, e.g. for an open trade.
pub fn block<S>(store: &mut S, participant: &str, amount: Money) -> LedgerResult<AccountMovement>
where
  S: AccountingStore + ?Sized,
{
  ensure_positive(amount)?;
  let mut account = account_or_new(store, participant)?;
  ensure_covers(participant, account.available, amount)?;
  book(store, &mut account, MovementKind::Block, -amount, amount, None)
}

/// Release previously blocked funds.
pub fn unblock<S>(store: &mut S, participant: &str, amount: Money) -> LedgerResult<AccountMovement>
where
  S: AccountingStore + ?Sized,
{
  ensure_positive(amount)?;
  let mut account = account_or_new(store, participant)?;
  ensure_covers(participant, account.blocked, amount)?;
  book(store, &mut account, MovementKind::Unblock, amount, -amount, None)
}

/// Record one movement against `account` and save both.
fn book<S>(
  store: &mut S,
  account: &mut ParticipantAccount,
  kind: MovementKind,
  available_delta: Money,
  blocked_delta: Money,
  reference: Option<String>,
) -> LedgerResult<AccountMovement>
where
  S: AccountingStore + ?Sized,
{
  let key = store.new_movement_key(&account.participant)?;
  let movement = AccountMovement::new(
    key,
    account.participant.as_str(),
    kind,
    available_delta,
    blocked_delta,
  )
  .with_reference(reference);

  account.apply(&movement)?;
  store.save_movement(&movement)?;
  store.save_account(account)?;
  Ok(movement)
}

fn ensure_positive(amount: Money) -> LedgerResult<()> {
  if amount <= 0 {
    return Err(LedgerError::InvalidAmount(amount));
  }
  Ok(())
}

fn ensure_covers(participant: &str, funds: Money, amount: Money) -> LedgerResult<()> {
  if funds < amount {
    return Err(LedgerError::InsufficientFunds {
      participant: participant.to_string(),
      needed: amount,
      available: funds,
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CachingSession;
  use crate::store::MemoryStore;

  #[test]
  fn test_deposit_then_transfer_in_one_session() {
    let mut store = MemoryStore::new();
    let mut session = CachingSession::new(&mut store);

    book_deposit(&mut session, "tx-1", "alice", 100, None).unwrap();
    // The store hasn't seen the deposit yet; the session has
    transfer(&mut session, "alice", "bob", 40, Some("trade-9".into())).unwrap();
    assert!(session.delegate().account("alice").is_none());

    session.flush().unwrap();
    drop(session);

    assert_eq!(store.account("alice").unwrap().available, 60);
    assert_eq!(store.account("bob").unwrap().available, 40);
    assert_eq!(store.deposit("tx-1").unwrap().amount, 100);
  }

  #[test]
  fn test_movements_are_linked_to_accounts() {
    let mut store = MemoryStore::new();
    let mut session = CachingSession::new(&mut store);

    let movement = book_deposit(&mut session, "tx-1", "alice", 10, None).unwrap();
    let account = session.get_account("alice").unwrap();

    assert_eq!(account.last_movement_key, movement.key);
    assert_eq!(movement.reference.as_deref(), Some("tx-1"));
    let key = movement.key.clone().unwrap();
    assert_eq!(session.get_movement(&key).unwrap(), movement);
  }

  #[test]
  fn test_duplicate_deposit_within_session() {
    let mut store = MemoryStore::new();
    let mut session = CachingSession::new(&mut store);

    book_deposit(&mut session, "tx-1", "alice", 10, None).unwrap();
    let err = book_deposit(&mut session, "tx-1", "alice", 10, None).unwrap_err();

    assert!(matches!(err, LedgerError::DuplicateDeposit(uid) if uid == "tx-1"));
    assert_eq!(session.get_account("alice").unwrap().available, 10);
  }

  #[test]
  fn test_duplicate_deposit_across_sessions() {
    let mut store = MemoryStore::new();
    book_deposit(&mut store, "tx-1", "alice", 10, None).unwrap();

    let mut session = CachingSession::new(&mut store);
    let err = book_deposit(&mut session, "tx-1", "alice", 10, None).unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateDeposit(_)));
    assert!(!session.has_pending_writes());
  }

  #[test]
  fn test_insufficient_funds_writes_nothing() {
    let mut store = MemoryStore::new();
    let mut session = CachingSession::new(&mut store);

    let err = transfer(&mut session, "alice", "bob", 5, None).unwrap_err();

    assert!(matches!(
      err,
      LedgerError::InsufficientFunds {
        needed: 5,
        available: 0,
        ..
      }
    ));
    assert!(!session.has_pending_writes());
  }

  #[test]
  fn test_rejects_bad_amounts_and_self_transfer() {
    let mut store = MemoryStore::new();

    assert!(matches!(
      book_deposit(&mut store, "tx", "alice", 0, None),
      Err(LedgerError::InvalidAmount(0))
    ));
    assert!(matches!(
      transfer(&mut store, "alice", "alice", 1, None),
      Err(LedgerError::SelfTransfer(_))
    ));
  }

  #[test]
  fn test_deposit_overflow_is_rejected() {
    let mut store = MemoryStore::new();
    let mut session = CachingSession::new(&mut store);
    book_deposit(&mut session, "tx-1", "alice", Money::MAX, None).unwrap();

    let err = book_deposit(&mut session, "tx-2", "alice", 1, None).unwrap_err();

    assert!(matches!(err, LedgerError::Overflow(p) if p == "alice"));
    assert_eq!(session.get_account("alice").unwrap().available, Money::MAX);
    assert!(session.get_deposit("tx-2").unwrap_err().is_not_found());
  }

  #[test]
  fn test_transfer_overflow_leaves_payer_untouched() {
    let mut store = MemoryStore::new();
    let mut session = CachingSession::new(&mut store);
    book_deposit(&mut session, "tx-1", "alice", 10, None).unwrap();
    book_deposit(&mut session, "tx-2", "bob", Money::MAX, None).unwrap();
    let pending = session.pending_writes();

    let err = transfer(&mut session, "alice", "bob", 1, None).unwrap_err();

    assert!(matches!(err, LedgerError::Overflow(p) if p == "bob"));
    assert_eq!(session.get_account("alice").unwrap().available, 10);
    assert_eq!(session.pending_writes(), pending);
  }

  #[test]
  fn test_block_and_unblock() {
    let mut store = MemoryStore::new();
    let mut session = CachingSession::new(&mut store);
    book_deposit(&mut session, "tx", "carol", 50, None).unwrap();

    block(&mut session, "carol", 20).unwrap();
    let account = session.get_account("carol").unwrap();
    assert_eq!((account.available, account.blocked), (30, 20));

    assert!(matches!(
      unblock(&mut session, "carol", 25),
      Err(LedgerError::InsufficientFunds { available: 20, .. })
    ));
    unblock(&mut session, "carol", 20).unwrap();
    let account = session.get_account("carol").unwrap();
    assert_eq!((account.available, account.blocked), (50, 0));
  }

  #[test]
  fn test_backend_errors_propagate() {
    struct Down;

    impl AccountingStore for Down {
      fn get_account(&mut self, _: &str) -> StoreResult<ParticipantAccount> {
        Err(StoreError::Unavailable("down".into()))
      }
      fn save_account(&mut self, _: &ParticipantAccount) -> StoreResult<()> {
        Err(StoreError::Unavailable("down".into()))
      }
      fn get_movement(&mut self, _: &str) -> StoreResult<AccountMovement> {
        Err(StoreError::Unavailable("down".into()))
      }
      fn save_movement(&mut self, _: &AccountMovement) -> StoreResult<()> {
        Err(StoreError::Unavailable("down".into()))
      }
      fn new_movement_key(&mut self, _: &str) -> StoreResult<String> {
        Err(StoreError::Unavailable("down".into()))
      }
      fn get_deposit(&mut self, _: &str) -> StoreResult<Deposit> {
        Err(StoreError::Unavailable("down".into()))
      }
      fn save_deposit(&mut self, _: &str, _: &Deposit) -> StoreResult<()> {
        Err(StoreError::Unavailable("down".into()))
      }
    }

    let err = book_deposit(&mut Down, "tx", "alice", 1, None).unwrap_err();
    assert!(matches!(err, LedgerError::Store(e) if e.is_retryable()));
  }
}
