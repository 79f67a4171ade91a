//! SQLite implementation of the accounting store.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::{AccountingStore, StoreError, StoreResult};
use crate::accounting::{AccountMovement, Deposit, ParticipantAccount};
use crate::cache::Cacheable;

/// Durable store keeping entities as JSON blobs in a single SQLite file.
pub struct SqliteStore {
  conn: Connection,
}

impl SqliteStore {
  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    let store = Self { conn };
    store.run_migrations()?;

    tracing::debug!(path = %path.display(), "opened ledger database");
    Ok(store)
  }

  /// Open a throwaway store that lives only as long as the value.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    let store = Self { conn };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("ledger-cache").join("ledger.db"))
  }

  /// Run database migrations.
  fn run_migrations(&self) -> Result<()> {
    self
      .conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  fn load_entity<T: Cacheable>(&self, key: &str) -> StoreResult<T> {
    let data: Option<Vec<u8>> = self
      .conn
      .query_row(
        "SELECT data FROM entities WHERE entity_type = ? AND entity_key = ?",
        params![T::entity_type(), key],
        |row| row.get(0),
      )
      .optional()?;

    match data {
      Some(data) => Ok(serde_json::from_slice(&data)?),
      None => Err(StoreError::not_found(T::entity_type(), key)),
    }
  }

  fn store_entity<T: Cacheable>(&self, key: &str, entity: &T) -> StoreResult<()> {
    let data = serde_json::to_vec(entity)?;

    self.conn.execute(
      "INSERT OR REPLACE INTO entities (entity_type, entity_key, data, updated_at, stored_at)
       VALUES (?, ?, ?, ?, datetime('now'))",
      params![T::entity_type(), key, data, entity.updated_at()],
    )?;

    Ok(())
  }
}

/// Schema for ledger tables.
const SCHEMA: &str = r#"
-- Accounts, movements and deposits as serialized JSON
CREATE TABLE IF NOT EXISTS entities (
    entity_type TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    data BLOB NOT NULL,
    updated_at TEXT,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (entity_type, entity_key)
);

CREATE INDEX IF NOT EXISTS idx_entities_updated
    ON entities(entity_type, updated_at);

-- One row per allocated movement key
CREATE TABLE IF NOT EXISTS movement_keys (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    participant TEXT NOT NULL,
    allocated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl AccountingStore for SqliteStore {
  fn get_account(&mut self, participant: &str) -> StoreResult<ParticipantAccount> {
    self.load_entity(participant)
  }

  fn save_account(&mut self, account: &ParticipantAccount) -> StoreResult<()> {
    if account.participant.is_empty() {
      return Err(StoreError::Precondition(
        "account has no participant".to_string(),
      ));
    }
    self.store_entity(&account.participant, account)
  }

  fn get_movement(&mut self, key: &str) -> StoreResult<AccountMovement> {
    self.load_entity(key)
  }

  fn save_movement(&mut self, movement: &AccountMovement) -> StoreResult<()> {
    let key = movement.key.as_deref().ok_or(StoreError::KeyNotSet)?;
    self.store_entity(key, movement)
  }

  fn new_movement_key(&mut self, participant: &str) -> StoreResult<String> {
    self.conn.execute(
      "INSERT INTO movement_keys (participant) VALUES (?)",
      params![participant],
    )?;
    let id = self.conn.last_insert_rowid();

    // Opaque, fixed-length key derived from the allocation row
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", participant, id).as_bytes());
    let digest = hasher.finalize();
    Ok(hex::encode(&digest[..12]))
  }

  fn get_deposit(&mut self, uid: &str) -> StoreResult<Deposit> {
    self.load_entity(uid)
  }

  fn save_deposit(&mut self, uid: &str, deposit: &Deposit) -> StoreResult<()> {
    self.store_entity(uid, deposit)
  }
}
