use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::backend::{ApiAction, Params};
use crate::resilience::{PauseCheck, SyncPhase};
use crate::service::ApiService;

/// A read refreshed on every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CriticalQuery {
  pub action: ApiAction,
  pub params: Params,
}

impl CriticalQuery {
  pub fn new(action: ApiAction, params: Params) -> Self {
    Self { action, params }
  }

  /// Unfiltered complaints list and dashboard metrics.
  pub fn defaults() -> Vec<Self> {
    vec![
      Self::new(ApiAction::GetComplaints, Params::new()),
      Self::new(ApiAction::GetDashboardData, Params::new()),
    ]
  }
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
  /// At least one query came back successfully
  Refreshed { refreshed: usize, failed: usize },
  /// Every query failed with a network or timeout error
  Failed { phase: SyncPhase },
  /// Nothing succeeded, but the backend answered; the failure count is left alone
  Inconclusive,
  /// Inside a pause window; nothing was sent
  Skipped { until: Instant },
  /// A cycle was already running
  Busy,
}

struct Running {
  stop: watch::Sender<bool>,
  handle: JoinHandle<()>,
}

struct SyncInner {
  service: ApiService,
  queries: Vec<CriticalQuery>,
  cycle: tokio::sync::Mutex<()>,
  task: Mutex<Option<Running>>,
  last: watch::Sender<Option<CycleOutcome>>,
}

/// Periodic refresher with an explicit start/stop lifecycle.
///
/// Health state lives in the service's [`crate::resilience::BackendAvailability`],
/// so foreground calls see the same pause window the synchronizer does.
#[derive(Clone)]
pub struct BackgroundSync {
  inner: Arc<SyncInner>,
}

impl BackgroundSync {
  pub fn new(service: ApiService, queries: Vec<CriticalQuery>) -> Self {
    let (last, _) = watch::channel(None);
    Self {
      inner: Arc::new(SyncInner {
        service,
        queries,
        cycle: tokio::sync::Mutex::new(()),
        task: Mutex::new(None),
        last,
      }),
    }
  }

  fn task(&self) -> MutexGuard<'_, Option<Running>> {
    self.inner.task.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Spawn the periodic loop. The first cycle runs one interval from now.
  pub fn start(&self) {
    let mut task = self.task();
    if task.is_some() {
      return;
    }

    let period = self.inner.service.settings().background_interval();
    let (stop, mut stopped) = watch::channel(false);
    let sync = self.clone();

    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        tokio::select! {
          _ = ticker.tick() => {
            sync.run_cycle().await;
          }
          _ = stopped.changed() => break,
        }
      }
      debug!("Background sync loop exited");
    });

    info!(interval_secs = period.as_secs(), "Background sync started");
    *task = Some(Running { stop, handle });
  }

  /// Stop the loop and wait for an in-flight cycle to finish.
  pub async fn stop(&self) {
    let running = self.task().take();
    if let Some(running) = running {
      let _ = running.stop.send(true);
      let _ = running.handle.await;
      info!("Background sync stopped");
    }
  }

  pub fn is_running(&self) -> bool {
    self.task().is_some()
  }

  /// Run one cycle now, waiting for any cycle already in flight.
  pub async fn run_cycle(&self) -> CycleOutcome {
    let _cycle = self.inner.cycle.lock().await;
    self.cycle().await
  }

  /// Refresh on regaining focus. Returns `Busy` instead of overlapping a
  /// cycle that is already running.
  pub async fn on_foreground(&self) -> CycleOutcome {
    match self.inner.cycle.try_lock() {
      Ok(_cycle) => {
        debug!("Foreground refresh");
        self.cycle().await
      }
      Err(_) => {
        debug!("Foreground refresh skipped, cycle in flight");
        CycleOutcome::Busy
      }
    }
  }

  /// Suppress cycles for `duration` without touching the failure count.
  pub fn pause(&self, duration: Duration) {
    self.inner.service.availability().pause_for(duration);
  }

  /// Lift any pause and zero the failure count.
  pub fn resume(&self) {
    self.inner.service.availability().resume();
  }

  pub fn phase(&self) -> SyncPhase {
    self.inner.service.availability().phase()
  }

  /// Receiver that sees the outcome of every finished cycle.
  pub fn subscribe(&self) -> watch::Receiver<Option<CycleOutcome>> {
    self.inner.last.subscribe()
  }

  async fn cycle(&self) -> CycleOutcome {
    let service = &self.inner.service;
    let availability = service.availability();
    let settings = service.settings();

    if let PauseCheck::Paused { until } = availability.check_pause() {
      debug!("Background sync paused, skipping cycle");
      return CycleOutcome::Skipped { until };
    }

    let timeout = settings.background_timeout();
    let results = join_all(
      self
        .inner
        .queries
        .iter()
        .map(|q| service.refresh(q.action, q.params.clone(), timeout)),
    )
    .await;

    let total = results.len();
    let refreshed = results
      .iter()
      .filter(|r| matches!(r, Ok(envelope) if envelope.success))
      .count();
    let network_failures = results
      .iter()
      .filter(|r| matches!(r, Err(err) if err.is_transient()))
      .count();

    let outcome = if refreshed > 0 {
      availability.mark_success();
      CycleOutcome::Refreshed {
        refreshed,
        failed: total - refreshed,
      }
    } else if total > 0 && network_failures == total {
      let phase = availability.record_sync_failure(
        settings.max_background_failures,
        settings.pause_duration(),
      );
      CycleOutcome::Failed { phase }
    } else {
      CycleOutcome::Inconclusive
    };

    debug!(?outcome, "Background sync cycle finished");
    self.inner.last.send_replace(Some(outcome));
    outcome
  }
}
