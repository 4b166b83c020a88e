//! Failure handling: retry executor and the shared availability flag.

mod availability;
mod retry;

pub use availability::{
  AvailabilityState, BackendAvailability, ConnectionStatus, PauseCheck, SyncPhase,
};
pub use retry::RetryPolicy;
