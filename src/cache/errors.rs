//! # Cache Error Types
//!
//! Structured error handling for the shared cache using thiserror.
//! `CacheError` is `Clone` because single-flight producers broadcast their
//! outcome, success or failure, to every waiting caller.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`crate::cache::SharedCache`] operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Operation addressed a namespace that was never registered
    #[error("Namespace not registered: {namespace}")]
    UnregisteredNamespace { namespace: String },

    /// Value could not be serialized or deserialized
    #[error("Serialization error for {namespace}:{key}: {message}")]
    Serialization {
        namespace: String,
        key: String,
        message: String,
    },

    /// A `get_or_set` producer failed; shared by every single-flight waiter
    #[error("Producer failed for {namespace}:{key}: {message}")]
    Producer {
        namespace: String,
        key: String,
        message: String,
    },

    /// Backing store rejected or failed an operation that could not be
    /// absorbed by the local mirror (counter semantics, for example)
    #[error("Backing store error: {message}")]
    Store { message: String },
}

impl CacheError {
    pub fn unregistered(namespace: impl Into<String>) -> Self {
        Self::UnregisteredNamespace {
            namespace: namespace.into(),
        }
    }

    pub fn serialization(
        namespace: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Serialization {
            namespace: namespace.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn producer(
        namespace: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Producer {
            namespace: namespace.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }
}

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors from a [`crate::cache::BackingStore`] implementation.
///
/// These are infrastructure failures by definition; the cache absorbs them
/// into the local mirror and reports them to the degradation manager rather
/// than propagating them to feature code.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        CacheError::store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::unregistered("cooldowns");
        assert!(format!("{err}").contains("cooldowns"));

        let err = CacheError::producer("api_responses", "user:42", "upstream 500");
        let rendered = format!("{err}");
        assert!(rendered.contains("api_responses:user:42"));
        assert!(rendered.contains("upstream 500"));
    }

    #[test]
    fn test_store_error_converts() {
        let err: CacheError = StoreError::Connection("refused".to_string()).into();
        assert!(matches!(err, CacheError::Store { .. }));
    }
}
