//! Speculative results for mutations that are still in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::key::key_matches;
use crate::backend::ResponseEnvelope;

/// Overlay consulted before the cache store on every cache-eligible read.
#[derive(Default)]
pub struct OptimisticOverlay {
  entries: Mutex<HashMap<String, ResponseEnvelope>>,
}

impl OptimisticOverlay {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, ResponseEnvelope>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn set(&self, key: &str, data: ResponseEnvelope) {
    debug!(key, "Optimistic entry set");
    self.lock().insert(key.to_string(), data);
  }

  pub fn get(&self, key: &str) -> Option<ResponseEnvelope> {
    self.lock().get(key).cloned()
  }

  pub fn clear(&self, key: &str) {
    if self.lock().remove(key).is_some() {
      debug!(key, "Optimistic entry cleared");
    }
  }

  /// Drop every entry under an action name (or one exact key).
  pub fn clear_matching(&self, prefix_or_key: &str) {
    self.lock().retain(|key, _| !key_matches(key, prefix_or_key));
  }

  pub fn clear_all(&self) {
    self.lock().clear();
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Set an entry that is cleared when the returned guard drops.
  ///
  /// Hold the guard across the network mutation: it clears the overlay on
  /// success, on failure, and when the mutation future is cancelled.
  pub fn set_scoped(self: &Arc<Self>, key: &str, data: ResponseEnvelope) -> OptimisticGuard {
    self.set(key, data);
    OptimisticGuard {
      key: key.to_string(),
      overlay: Arc::clone(self),
    }
  }
}

pub struct OptimisticGuard {
  key: String,
  overlay: Arc<OptimisticOverlay>,
}

impl OptimisticGuard {
  pub fn key(&self) -> &str {
    &self.key
  }
}

impl Drop for OptimisticGuard {
  fn drop(&mut self) {
    self.overlay.clear(&self.key);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_set_get_clear() {
    let overlay = OptimisticOverlay::new();
    overlay.set("getComplaints:", ResponseEnvelope::ok(json!([1])));
    assert!(overlay.get("getComplaints:").is_some());
    overlay.clear("getComplaints:");
    assert!(overlay.get("getComplaints:").is_none());
  }

  #[test]
  fn test_guard_clears_on_drop() {
    let overlay = OptimisticOverlay::new();
    {
      let guard = overlay.set_scoped("getComplaints:", ResponseEnvelope::ok(json!([])));
      assert_eq!(guard.key(), "getComplaints:");
      assert_eq!(overlay.len(), 1);
    }
    assert!(overlay.is_empty());
  }

  #[test]
  fn test_guard_clears_when_work_panics() {
    let overlay = OptimisticOverlay::new();
    let cloned = Arc::clone(&overlay);
    let result = std::panic::catch_unwind(move || {
      let _guard = cloned.set_scoped("getUsers:", ResponseEnvelope::ok(json!([])));
      panic!("mutation blew up");
    });
    assert!(result.is_err());
    assert!(overlay.is_empty());
  }

  #[test]
  fn test_clear_matching() {
    let overlay = OptimisticOverlay::new();
    overlay.set("getComplaints:", ResponseEnvelope::ok(json!([])));
    overlay.set("getComplaints:status=\"open\"", ResponseEnvelope::ok(json!([])));
    overlay.set("getUsers:", ResponseEnvelope::ok(json!([])));
    overlay.clear_matching("getComplaints");
    assert_eq!(overlay.len(), 1);
  }
}
