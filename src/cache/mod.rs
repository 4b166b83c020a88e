//! Client-side request caching.
//!
//! This module provides the pieces the service stacks on top of a backend:
//! - Deterministic cache keys (`action:sorted-params`)
//! - A TTL cache store with bounded size and prefix invalidation
//! - An optimistic overlay for in-flight mutations
//! - A de-duplicator so identical concurrent reads share one network call

mod dedup;
mod key;
mod optimistic;
mod store;

pub use dedup::RequestDeduplicator;
pub use key::{cache_key, key_matches};
pub use optimistic::{OptimisticGuard, OptimisticOverlay};
pub use store::{CacheEntry, CacheStore};
