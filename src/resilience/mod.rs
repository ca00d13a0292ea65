//! # Resilience Module
//!
//! Circuit breaker patterns isolating the shard from failing dependencies:
//! the shared datastore, third-party chat-platform APIs, and anything else
//! a feature wraps. Breakers are looked up by name through the registry and
//! classify errors before counting them, so business outcomes never trip a
//! circuit.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use herald_core::resilience::{CircuitBreakerProfile, CircuitBreakerRegistry};
//! use herald_core::cache::StoreError;
//!
//! # async fn example() {
//! let registry = CircuitBreakerRegistry::default();
//! let breaker = registry.get_or_create_with_profile(
//!     "twitch_api",
//!     CircuitBreakerProfile::external_api(),
//! );
//!
//! let result = breaker
//!     .execute(|| async {
//!         // Outbound API call here
//!         Ok::<_, StoreError>("payload")
//!     })
//!     .await;
//! # let _ = result;
//! # }
//! ```

pub mod circuit_breaker;
pub mod classification;
pub mod metrics;
pub mod registry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerProfile, CircuitState, TransitionListener,
};
pub use classification::FailureClassification;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use registry::CircuitBreakerRegistry;
