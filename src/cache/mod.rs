//! Session-scoped write-back caching for the accounting store.
//!
//! This module provides:
//! - A generic per-kind entity cache with dirty tracking
//! - A caching session that serves reads from the cache (read-your-own-writes)
//!   and defers writes until an explicit, retriable flush

mod entity;
mod session;
mod traits;

pub use entity::EntityCache;
pub use session::{CachingSession, FlushRetry, FlushStats};
pub use traits::Cacheable;
