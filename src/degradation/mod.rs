//! # Degradation Management
//!
//! Per-service health tracking with worst-of aggregation, a last-known-good
//! fallback cache, and a bounded write-intent queue replayed once its target
//! recovers. Built on the shared cache through the narrow [`StateStore`]
//! seam so the two components stay decoupled.

pub mod errors;
pub mod health;
pub mod manager;
pub mod write_queue;

pub use errors::{DegradationError, DegradationResult};
pub use health::{DegradationLevel, HealthState, ServiceHealth};
pub use manager::{
    DegradationManager, DegradationSnapshot, FallbackSupplier, StateStore, WriteExecutor,
};
pub use write_queue::{DeadLetter, QueuedWrite};
