//! In-memory backend for tests: counts calls, injects failures and latency,
//! and serves records from its own copy of the demo seed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{ApiAction, ApiError, Backend, Request, ResponseEnvelope};
use crate::demo::DemoDataset;

#[derive(Default)]
pub struct FakeBackend {
  data: DemoDataset,
  calls: Mutex<Vec<Request>>,
  offline: AtomicBool,
  latency: Mutex<Duration>,
  scripted: Mutex<HashMap<ApiAction, Result<ResponseEnvelope, ApiError>>>,
}

impl FakeBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every call fails with a network error while set.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn set_latency(&self, latency: Duration) {
    *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
  }

  /// Answer `action` with a fixed result instead of the dataset.
  pub fn script(&self, action: ApiAction, result: Result<ResponseEnvelope, ApiError>) {
    self
      .scripted
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(action, result);
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn calls_for(&self, action: ApiAction) -> usize {
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .filter(|r| r.action == action)
      .count()
  }

  pub fn last_call(&self) -> Option<Request> {
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .last()
      .cloned()
  }
}

#[async_trait]
impl Backend for FakeBackend {
  async fn request(&self, request: Request) -> Result<ResponseEnvelope, ApiError> {
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(request.clone());

    let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
    if !latency.is_zero() {
      tokio::time::sleep(latency).await;
    }

    if self.offline.load(Ordering::SeqCst) {
      return Err(ApiError::Network("connection refused".into()));
    }

    let scripted = self
      .scripted
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&request.action)
      .cloned();
    if let Some(result) = scripted {
      return result;
    }

    let token = request.token.as_deref();
    Ok(self.data.answer(request.action, &request.params, token))
  }

  fn name(&self) -> &'static str {
    "fake"
  }
}
