//! # Degradation Error Types

use thiserror::Error;

/// Errors surfaced by the degradation manager
#[derive(Debug, Clone, Error)]
pub enum DegradationError {
    /// Write queue for a target is at capacity and eviction is disabled
    #[error("Write queue full for target {target}: {size} entries")]
    QueueFull { target: String, size: usize },

    /// No fallback value or supplier known for a key
    #[error("No fallback available for key: {key}")]
    NoFallback { key: String },

    /// No write executor registered for a target whose queue has entries
    #[error("No write executor registered for target: {target}")]
    NoExecutor { target: String },

    /// A replayed write failed after exhausting its retry budget
    #[error("Write {write_id} for {target} moved to dead letter after {attempts} attempts")]
    DeadLettered {
        target: String,
        write_id: String,
        attempts: u32,
    },

    /// Underlying store failure while persisting degradation state
    #[error("Degradation store error: {message}")]
    Store { message: String },
}

impl DegradationError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }
}

/// Result type alias for degradation operations
pub type DegradationResult<T> = Result<T, DegradationError>;
