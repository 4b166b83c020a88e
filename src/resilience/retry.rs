//! Bounded retry with linear backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::availability::BackendAvailability;
use crate::backend::ApiError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  attempts: u32,
  delay: Duration,
}

impl RetryPolicy {
  pub fn new(attempts: u32, delay: Duration) -> Self {
    Self {
      attempts: attempts.max(1),
      delay,
    }
  }

  pub fn attempts(&self) -> u32 {
    self.attempts
  }

  /// Run `operation` up to `attempts` times, sleeping `delay * attempt`
  /// between tries.
  ///
  /// Only transient errors are retried; anything else returns at once. When
  /// the last attempt fails the backend is marked unavailable and that error
  /// is returned. Resetting availability on success is the caller's call.
  pub async fn run<T, F, Fut>(
    &self,
    availability: &BackendAvailability,
    mut operation: F,
  ) -> Result<T, ApiError>
  where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let mut attempt = 1;
    loop {
      match operation(attempt).await {
        Ok(value) => return Ok(value),
        Err(err) if !err.is_transient() => return Err(err),
        Err(err) if attempt >= self.attempts => {
          warn!(attempts = attempt, error = %err, "Giving up after retries");
          availability.mark_unavailable();
          return Err(err);
        }
        Err(err) => {
          let backoff = self.delay * attempt;
          warn!(attempt, backoff_ms = backoff.as_millis() as u64, error = %err, "Request failed, retrying");
          tokio::time::sleep(backoff).await;
          attempt += 1;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use tokio::time::Instant;

  #[tokio::test(start_paused = true)]
  async fn test_invokes_exactly_attempts_times() {
    let policy = RetryPolicy::new(3, Duration::from_secs(1));
    let availability = BackendAvailability::new();
    let calls = AtomicU32::new(0);

    let result: Result<(), ApiError> = policy
      .run(&availability, |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(ApiError::Network("down".into())) }
      })
      .await;

    assert_eq!(result, Err(ApiError::Network("down".into())));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(!availability.is_available());
  }

  #[tokio::test(start_paused = true)]
  async fn test_backoff_is_linear() {
    let policy = RetryPolicy::new(3, Duration::from_secs(1));
    let availability = BackendAvailability::new();
    let started = Instant::now();

    let _: Result<(), ApiError> = policy
      .run(&availability, |_| async { Err(ApiError::Timeout(5)) })
      .await;

    // 1s after the first failure, 2s after the second.
    assert_eq!(started.elapsed(), Duration::from_secs(3));
  }

  #[tokio::test(start_paused = true)]
  async fn test_recovers_mid_way() {
    let policy = RetryPolicy::new(3, Duration::from_millis(10));
    let availability = BackendAvailability::new();

    let result = policy
      .run(&availability, |attempt| async move {
        if attempt < 2 {
          Err(ApiError::Server("502".into()))
        } else {
          Ok(attempt)
        }
      })
      .await;

    assert_eq!(result, Ok(2));
    assert!(availability.is_available());
  }

  #[tokio::test]
  async fn test_business_errors_are_not_retried() {
    let policy = RetryPolicy::new(3, Duration::from_millis(10));
    let availability = BackendAvailability::new();
    let calls = AtomicU32::new(0);

    let result: Result<(), ApiError> = policy
      .run(&availability, |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(ApiError::Rejected("Insufficient permissions".into())) }
      })
      .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(availability.is_available());
  }
}
