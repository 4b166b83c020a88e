//! Background refresh of critical queries.

mod synchronizer;

pub use synchronizer::{BackgroundSync, CriticalQuery, CycleOutcome};
