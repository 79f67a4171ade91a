//! Accounting entities persisted by the store and cached per session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ledger::LedgerError;
use crate::cache::Cacheable;

/// Amount in the smallest currency unit.
pub type Money = i64;

/// Balance sheet of one marketplace participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantAccount {
  pub participant: String,
  /// Funds the participant may spend
  pub available: Money,
  /// Funds reserved for open trades
  pub blocked: Money,
  /// Key of the most recent movement booked against this account
  pub last_movement_key: Option<String>,
}

impl ParticipantAccount {
  /// A fresh account with zero balances.
  pub fn new(participant: impl Into<String>) -> Self {
    Self {
      participant: participant.into(),
      available: 0,
      blocked: 0,
      last_movement_key: None,
    }
  }

  /// Apply a movement's deltas and link it as the latest movement.
  ///
  /// The account is left untouched when either balance would overflow.
  pub fn apply(&mut self, movement: &AccountMovement) -> Result<(), LedgerError> {
    let overflow = || LedgerError::Overflow(self.participant.clone());
    let available = self
      .available
      .checked_add(movement.available_delta)
      .ok_or_else(overflow)?;
    let blocked = self
      .blocked
      .checked_add(movement.blocked_delta)
      .ok_or_else(overflow)?;

    self.available = available;
    self.blocked = blocked;
    self.last_movement_key = movement.key.clone();
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
  Deposit,
  TransferIn,
  TransferOut,
  Block,
  Unblock,
}

/// One ledger entry changing a participant's balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMovement {
  /// Issued by the store; a movement without a key can't be saved
  pub key: Option<String>,
  pub participant: String,
  pub kind: MovementKind,
  pub timestamp: DateTime<Utc>,
  pub available_delta: Money,
  pub blocked_delta: Money,
  /// Deposit uid or trade reference this movement belongs to
  pub reference: Option<String>,
}

impl AccountMovement {
  pub fn new(
    key: impl Into<String>,
    participant: impl Into<String>,
    kind: MovementKind,
    available_delta: Money,
    blocked_delta: Money,
  ) -> Self {
    Self {
      key: Some(key.into()),
      participant: participant.into(),
      kind,
      timestamp: Utc::now(),
      available_delta,
      blocked_delta,
      reference: None,
    }
  }

  pub fn with_reference(mut self, reference: Option<String>) -> Self {
    self.reference = reference;
    self
  }
}

/// An incoming payment credited to a participant.
///
/// Identified by an external uid (e.g. a payment reference) that is passed
/// alongside the record rather than stored in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
  pub participant: String,
  pub amount: Money,
  pub reference: Option<String>,
  pub created: DateTime<Utc>,
}

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for ParticipantAccount {
  fn updated_at(&self) -> Option<String> {
    // Accounts don't carry a modification timestamp
    None
  }

  fn entity_type() -> &'static str {
    "account"
  }
}

impl Cacheable for AccountMovement {
  fn updated_at(&self) -> Option<String> {
    Some(self.timestamp.to_rfc3339())
  }

  fn entity_type() -> &'static str {
    "movement"
  }
}

impl Cacheable for Deposit {
  fn updated_at(&self) -> Option<String> {
    Some(self.created.to_rfc3339())
  }

  fn entity_type() -> &'static str {
    "deposit"
  }
}
