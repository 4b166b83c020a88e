//! In-memory response cache with TTL expiry and bounded size.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::key::key_matches;
use crate::backend::ResponseEnvelope;

/// A cached response snapshot.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key: String,
  pub data: ResponseEnvelope,
  pub timestamp: Instant,
}

#[derive(Default)]
struct StoreState {
  entries: HashMap<String, CacheEntry>,
  /// Bumped on every invalidation; fetches started under an older epoch
  /// must not write their (possibly stale) result back.
  epoch: u64,
}

/// Keyed store of timestamped responses.
///
/// Expiry is lazy: an entry older than the TTL is removed when it is next
/// read. When full, inserting a new key evicts the oldest entry.
pub struct CacheStore {
  state: Mutex<StoreState>,
  ttl: Duration,
  max_entries: usize,
}

impl CacheStore {
  pub fn new(ttl: Duration, max_entries: usize) -> Self {
    Self {
      state: Mutex::new(StoreState::default()),
      ttl,
      max_entries: max_entries.max(1),
    }
  }

  fn lock(&self) -> MutexGuard<'_, StoreState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Fresh value for `key`, if any.
  pub fn get(&self, key: &str) -> Option<ResponseEnvelope> {
    let mut state = self.lock();
    let fresh = match state.entries.get(key) {
      Some(entry) => entry.timestamp.elapsed() < self.ttl,
      None => return None,
    };

    if fresh {
      state.entries.get(key).map(|e| e.data.clone())
    } else {
      debug!(key, "Cache entry expired");
      state.entries.remove(key);
      None
    }
  }

  pub fn set(&self, key: &str, data: ResponseEnvelope) {
    let mut state = self.lock();
    self.insert(&mut state, key, data);
  }

  /// Insert only if nothing was invalidated since `epoch` was read.
  pub fn set_if_current(&self, key: &str, data: ResponseEnvelope, epoch: u64) -> bool {
    let mut state = self.lock();
    if state.epoch != epoch {
      debug!(key, "Dropping fetch result that raced an invalidation");
      return false;
    }
    self.insert(&mut state, key, data);
    true
  }

  fn insert(&self, state: &mut StoreState, key: &str, data: ResponseEnvelope) {
    if !state.entries.contains_key(key) && state.entries.len() >= self.max_entries {
      let oldest = state
        .entries
        .values()
        .min_by_key(|e| e.timestamp)
        .map(|e| e.key.clone());
      if let Some(oldest) = oldest {
        debug!(key = %oldest, "Evicting oldest cache entry");
        state.entries.remove(&oldest);
      }
    }

    state.entries.insert(
      key.to_string(),
      CacheEntry {
        key: key.to_string(),
        data,
        timestamp: Instant::now(),
      },
    );
  }

  /// Remove one key, or every key built from an action name.
  /// Returns how many entries were removed.
  pub fn invalidate(&self, prefix_or_key: &str) -> usize {
    let mut state = self.lock();
    state.epoch += 1;
    let before = state.entries.len();
    state.entries.retain(|key, _| !key_matches(key, prefix_or_key));
    let removed = before - state.entries.len();
    if removed > 0 {
      debug!(prefix = prefix_or_key, removed, "Invalidated cache entries");
    }
    removed
  }

  pub fn clear(&self) {
    let mut state = self.lock();
    state.epoch += 1;
    state.entries.clear();
  }

  pub fn epoch(&self) -> u64 {
    self.lock().epoch
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn contains(&self, key: &str) -> bool {
    self.lock().entries.contains_key(key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  const TTL: Duration = Duration::from_secs(300);

  fn env(n: i64) -> ResponseEnvelope {
    ResponseEnvelope::ok(json!(n))
  }

  #[tokio::test(start_paused = true)]
  async fn test_get_within_ttl() {
    let store = CacheStore::new(TTL, 10);
    store.set("getUsers:", env(1));
    tokio::time::advance(TTL - Duration::from_millis(1)).await;
    assert_eq!(store.get("getUsers:"), Some(env(1)));
  }

  #[tokio::test(start_paused = true)]
  async fn test_expired_entry_is_removed_on_read() {
    let store = CacheStore::new(TTL, 10);
    store.set("getUsers:", env(1));
    tokio::time::advance(TTL).await;
    assert_eq!(store.get("getUsers:"), None);
    assert!(!store.contains("getUsers:"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_eviction_removes_oldest() {
    let store = CacheStore::new(TTL, 3);
    for (i, key) in ["a:", "b:", "c:"].iter().enumerate() {
      store.set(key, env(i as i64));
      tokio::time::advance(Duration::from_secs(1)).await;
    }
    // Overwriting an existing key never evicts.
    store.set("b:", env(9));
    assert_eq!(store.len(), 3);

    store.set("d:", env(3));
    assert_eq!(store.len(), 3);
    assert!(!store.contains("a:"));
    assert!(store.contains("b:"));
    assert!(store.contains("c:"));
    assert!(store.contains("d:"));
  }

  #[tokio::test]
  async fn test_invalidate_by_prefix() {
    let store = CacheStore::new(TTL, 10);
    store.set("getComplaints:", env(1));
    store.set("getComplaints:status=\"open\"", env(2));
    store.set("getUsers:", env(3));

    assert_eq!(store.invalidate("getComplaints"), 2);
    assert!(store.contains("getUsers:"));
    assert_eq!(store.invalidate("getUsers:"), 1);
    assert!(store.is_empty());
  }

  #[tokio::test]
  async fn test_set_if_current_rejects_stale_epoch() {
    let store = CacheStore::new(TTL, 10);
    let epoch = store.epoch();
    store.invalidate("getComplaints");
    assert!(!store.set_if_current("getComplaints:", env(1), epoch));
    assert!(store.is_empty());

    let epoch = store.epoch();
    assert!(store.set_if_current("getComplaints:", env(2), epoch));
    assert_eq!(store.get("getComplaints:"), Some(env(2)));
  }
}
