//! # Core Error Types
//!
//! Top-level error enum for the Herald core. Component modules define their
//! own structured errors (`CacheError`, `BridgeError`, `DegradationError`);
//! this type exists for callers that hold several components behind one
//! result type.

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::cache::CacheError;
use crate::degradation::DegradationError;

/// Aggregated error type for consumers of multiple Herald components
#[derive(Debug, Error)]
pub enum HeraldError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Degradation(#[from] DegradationError),

    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl HeraldError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result type alias for Herald core operations
pub type Result<T> = std::result::Result<T, HeraldError>;
