//! Client-side access layer for the utility complaint-management backend.
//!
//! [`ApiService`] is the entry point: it answers every operation through a
//! response cache, an optimistic overlay, request de-duplication, bounded
//! retries, and a demo dataset used when the backend cannot be reached.
//! [`sync::BackgroundSync`] keeps critical queries fresh in the background.

pub mod backend;
pub mod cache;
pub mod config;
pub mod demo;
pub mod models;
pub mod resilience;
pub mod service;
pub mod session;
pub mod sync;

pub use service::{ApiResult, ApiService};
