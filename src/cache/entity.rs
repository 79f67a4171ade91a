//! Per-kind entity cache with dirty tracking.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::traits::Cacheable;
use crate::store::StoreResult;

/// Latest in-session values of one entity kind and the keys that still have
/// to be written back.
///
/// Every dirty key has a cached value. Dirty keys are kept ordered so write
/// back happens in a stable order.
#[derive(Debug)]
pub struct EntityCache<T: Cacheable> {
  values: HashMap<String, T>,
  dirty: BTreeSet<String>,
}

impl<T: Cacheable> Default for EntityCache<T> {
  fn default() -> Self {
    Self {
      values: HashMap::new(),
      dirty: BTreeSet::new(),
    }
  }
}

impl<T: Cacheable> EntityCache<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Look up `key`, falling back to `fetch` on a miss.
  ///
  /// Successful fetches are cached; errors are returned as-is and leave the
  /// cache untouched, so the next lookup asks the delegate again.
  pub fn get<F>(&mut self, key: &str, fetch: F) -> StoreResult<T>
  where
    F: FnOnce(&str) -> StoreResult<T>,
  {
    self.get_with(key, fetch, |_| {})
  }

  /// Like [`get`](Self::get), but lets the caller fix up a freshly fetched
  /// value before it is cached.
  pub fn get_with<F, A>(&mut self, key: &str, fetch: F, adjust: A) -> StoreResult<T>
  where
    F: FnOnce(&str) -> StoreResult<T>,
    A: FnOnce(&mut T),
  {
    if let Some(value) = self.values.get(key) {
      debug!(kind = T::entity_type(), key, "session cache hit");
      return Ok(value.clone());
    }

    debug!(kind = T::entity_type(), key, "session cache miss");
    let mut value = fetch(key)?;
    adjust(&mut value);
    self.values.insert(key.to_string(), value.clone());
    Ok(value)
  }

  /// Overwrite the cached value and mark it for write back.
  pub fn put(&mut self, key: impl Into<String>, value: T) {
    let key = key.into();
    self.dirty.insert(key.clone());
    self.values.insert(key, value);
  }

  /// Snapshot of the dirty entries, in key order.
  ///
  /// The returned values are copies; later puts don't affect them.
  pub fn drain_dirty(&self) -> std::vec::IntoIter<(String, T)> {
    self
      .dirty
      .iter()
      .filter_map(|key| {
        let value = self.values.get(key);
        debug_assert!(value.is_some(), "dirty key {key} has no cached value");
        value.map(|v| (key.clone(), v.clone()))
      })
      .collect::<Vec<_>>()
      .into_iter()
  }

  /// Forget that `key` needs to be written back.
  pub fn mark_clean(&mut self, key: &str) {
    self.dirty.remove(key);
  }

  pub fn contains(&self, key: &str) -> bool {
    self.values.contains_key(key)
  }

  pub fn is_dirty(&self, key: &str) -> bool {
    self.dirty.contains(key)
  }

  pub fn dirty_len(&self) -> usize {
    self.dirty.len()
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}
