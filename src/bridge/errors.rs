//! # Bridge Error Types

use thiserror::Error;

/// Errors surfaced by the shard bridge
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Pub/sub transport failed to publish or subscribe
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// No response arrived before the deadline. For all-shard requests this
    /// means zero responses; partial results resolve normally.
    #[error("Request {request_type} timed out after {timeout_ms}ms")]
    Timeout {
        request_type: String,
        timeout_ms: u64,
    },

    /// Request type not present in the closed handler set
    #[error("No handler registered for request type: {request_type}")]
    UnknownRequestType { request_type: String },

    /// A handler rejected the request
    #[error("Handler for {request_type} failed: {message}")]
    Handler {
        request_type: String,
        message: String,
    },

    /// Envelope could not be serialized or parsed
    #[error("Envelope serialization error: {message}")]
    Serialization { message: String },
}

impl BridgeError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn timeout(request_type: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            request_type: request_type.into(),
            timeout_ms,
        }
    }

    pub fn unknown_request_type(request_type: impl Into<String>) -> Self {
        Self::UnknownRequestType {
            request_type: request_type.into(),
        }
    }

    pub fn handler(request_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            request_type: request_type.into(),
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
