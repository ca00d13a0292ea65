//! # Failure Classification
//!
//! Distinguishes infrastructure failures from business outcomes before any
//! breaker counter moves. Timeouts, refused connections, and unreachable
//! stores count toward tripping; not-found, rate-limited, and validation
//! outcomes never do - they are ordinary results that happen to be errors.

use crate::bridge::BridgeError;
use crate::cache::{CacheError, StoreError};

/// Classification seam consulted by [`crate::resilience::CircuitBreaker`]
/// before the failure counter increments. Classification precedes counting;
/// an error whose `is_infrastructure_failure` returns `false` can pass
/// through a breaker any number of times without moving it out of Closed.
pub trait FailureClassification {
    fn is_infrastructure_failure(&self) -> bool;
}

impl FailureClassification for StoreError {
    fn is_infrastructure_failure(&self) -> bool {
        true
    }
}

impl FailureClassification for CacheError {
    fn is_infrastructure_failure(&self) -> bool {
        matches!(self, CacheError::Store { .. })
    }
}

impl FailureClassification for BridgeError {
    fn is_infrastructure_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::Transport { .. } | BridgeError::Timeout { .. }
        )
    }
}

impl FailureClassification for std::io::Error {
    fn is_infrastructure_failure(&self) -> bool {
        true
    }
}
