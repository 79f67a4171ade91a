//! Core traits for the caching system.

use serde::{de::DeserializeOwned, Serialize};

/// Trait for entities that can be cached and persisted.
///
/// Cache keys are supplied by the caller, so implementors only describe
/// themselves for storage organization and logging.
pub trait Cacheable: Clone + Serialize + DeserializeOwned {
  /// Last modification timestamp (RFC 3339).
  /// Returns None if the entity doesn't track modification time.
  fn updated_at(&self) -> Option<String>;

  /// Entity type name for storage organization (e.g., "account", "movement")
  fn entity_type() -> &'static str;
}
