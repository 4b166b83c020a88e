//! Process-wide backend availability and the pause state machine.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

/// Snapshot of backend health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityState {
  pub is_available: bool,
  pub consecutive_failures: u32,
  pub paused_until: Option<Instant>,
}

impl Default for AvailabilityState {
  fn default() -> Self {
    Self {
      is_available: true,
      consecutive_failures: 0,
      paused_until: None,
    }
  }
}

/// Where the background synchronizer stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
  /// Cycles run every interval
  Active,
  /// Cycles still run, failures accumulating
  Degraded,
  /// Cycles skipped until the deadline
  Paused { until: Instant },
}

/// Ambient indicator for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
  Online,
  Degraded,
  Offline,
  Demo,
}

impl std::fmt::Display for ConnectionStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      Self::Online => "online",
      Self::Degraded => "degraded",
      Self::Offline => "offline",
      Self::Demo => "demo",
    };
    f.write_str(label)
  }
}

/// Outcome of checking the pause window at the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseCheck {
  NotPaused,
  Paused { until: Instant },
  /// The window just elapsed; failures were reset.
  Expired,
}

#[derive(Default)]
struct Inner {
  state: AvailabilityState,
  serving_demo: bool,
}

/// Shared availability flag, written by the retry executor and the
/// synchronizer, read by anyone deciding whether to use the demo dataset.
#[derive(Default)]
pub struct BackendAvailability {
  inner: Mutex<Inner>,
}

impl BackendAvailability {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn snapshot(&self) -> AvailabilityState {
    self.lock().state
  }

  pub fn is_available(&self) -> bool {
    self.lock().state.is_available
  }

  /// A call reached the backend.
  pub fn mark_success(&self) {
    let mut inner = self.lock();
    if !inner.state.is_available {
      info!("Backend reachable again");
    }
    inner.state.is_available = true;
    inner.state.consecutive_failures = 0;
    inner.serving_demo = false;
  }

  /// Retries were exhausted.
  pub fn mark_unavailable(&self) {
    let mut inner = self.lock();
    if inner.state.is_available {
      warn!("Backend marked unavailable");
    }
    inner.state.is_available = false;
  }

  pub fn mark_serving_demo(&self) {
    self.lock().serving_demo = true;
  }

  /// Count one failed sync cycle; pause once `max_failures` is reached.
  pub fn record_sync_failure(&self, max_failures: u32, pause: Duration) -> SyncPhase {
    let mut inner = self.lock();
    inner.state.consecutive_failures += 1;
    let failures = inner.state.consecutive_failures;

    if failures >= max_failures.max(1) {
      let until = Instant::now() + pause;
      inner.state.paused_until = Some(until);
      inner.state.is_available = false;
      warn!(failures, pause_secs = pause.as_secs(), "Background sync paused");
      SyncPhase::Paused { until }
    } else {
      warn!(failures, "Background sync cycle failed");
      SyncPhase::Degraded
    }
  }

  /// Apply the Paused -> Active transition if the window has elapsed.
  pub fn check_pause(&self) -> PauseCheck {
    let mut inner = self.lock();
    match inner.state.paused_until {
      Some(until) if Instant::now() < until => PauseCheck::Paused { until },
      Some(_) => {
        inner.state.paused_until = None;
        inner.state.consecutive_failures = 0;
        info!("Background sync pause elapsed, resuming");
        PauseCheck::Expired
      }
      None => PauseCheck::NotPaused,
    }
  }

  pub fn is_paused(&self) -> bool {
    self
      .lock()
      .state
      .paused_until
      .is_some_and(|until| Instant::now() < until)
  }

  /// Manual suppression; leaves the failure counter alone.
  pub fn pause_for(&self, duration: Duration) {
    let until = Instant::now() + duration;
    self.lock().state.paused_until = Some(until);
    info!(pause_secs = duration.as_secs(), "Background sync paused manually");
  }

  /// Clear any pause and the failure counter.
  pub fn resume(&self) {
    let mut inner = self.lock();
    inner.state.paused_until = None;
    inner.state.consecutive_failures = 0;
    info!("Background sync resumed");
  }

  pub fn phase(&self) -> SyncPhase {
    let state = self.lock().state;
    match state.paused_until {
      Some(until) if Instant::now() < until => SyncPhase::Paused { until },
      _ if state.consecutive_failures > 0 => SyncPhase::Degraded,
      _ => SyncPhase::Active,
    }
  }

  pub fn status(&self) -> ConnectionStatus {
    let inner = self.lock();
    if inner.serving_demo {
      ConnectionStatus::Demo
    } else if !inner.state.is_available {
      ConnectionStatus::Offline
    } else if inner.state.consecutive_failures > 0 {
      ConnectionStatus::Degraded
    } else {
      ConnectionStatus::Online
    }
  }
}
