//! # Event System
//!
//! In-process broadcast channel for component lifecycle events. The
//! degradation manager publishes health transitions here; the write-queue
//! replay worker is the primary consumer.

pub mod publisher;

pub use publisher::{EventPublisher, HealthTransition};
