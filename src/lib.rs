//! Write-back caching for a marketplace accounting store.
//!
//! A [`CachingSession`](cache::CachingSession) wraps any
//! [`AccountingStore`](store::AccountingStore) for one unit of work: it reads
//! through to the store once per key, keeps every write local so later reads
//! see it, and writes everything back on an explicit, retriable flush.

pub mod accounting;
pub mod cache;
pub mod config;
pub mod logging;
pub mod resources;
pub mod store;
