//! Request de-duplication: concurrent reads of one key share one call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use super::key::key_matches;

type SharedRequest<T> = Shared<BoxFuture<'static, T>>;

/// Table of in-flight requests keyed by cache key.
///
/// The first caller for a key starts the work; later callers await a clone of
/// the same shared future and observe the same settled value.
pub struct RequestDeduplicator<T: Clone> {
  pending: Mutex<HashMap<String, SharedRequest<T>>>,
}

impl<T: Clone> Default for RequestDeduplicator<T> {
  fn default() -> Self {
    Self {
      pending: Mutex::new(HashMap::new()),
    }
  }
}

impl<T> RequestDeduplicator<T>
where
  T: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedRequest<T>>> {
    self.pending.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Run `start()` for `key` unless an identical request is already in flight.
  pub async fn run<F, Fut>(&self, key: &str, start: F) -> T
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T> + Send + 'static,
  {
    let shared = {
      let mut pending = self.lock();
      match pending.get(key) {
        Some(existing) => {
          debug!(key, "Joining in-flight request");
          existing.clone()
        }
        None => {
          let request = start().boxed().shared();
          pending.insert(key.to_string(), request.clone());
          request
        }
      }
    };

    let result = shared.clone().await;

    // A newer request may have replaced ours after an invalidation.
    let mut pending = self.lock();
    if pending.get(key).is_some_and(|current| current.ptr_eq(&shared)) {
      pending.remove(key);
    }
    result
  }

  /// Detach in-flight requests for a resource so the next read starts fresh.
  /// Callers already waiting still receive their result.
  pub fn forget_matching(&self, prefix_or_key: &str) {
    self.lock().retain(|key, _| !key_matches(key, prefix_or_key));
  }

  pub fn forget_all(&self) {
    self.lock().clear();
  }

  pub fn in_flight(&self) -> usize {
    self.lock().len()
  }
}
