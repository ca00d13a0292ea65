//! # Circuit Breaker Protected Backing Store
//!
//! Wraps a [`BackingStore`] with circuit breaker protection so a dying
//! substrate fails fast instead of stacking up timeouts. The cache already
//! degrades to its local mirror on any store error; the breaker in front
//! keeps the outage cheap while it lasts.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::resilience::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerProfile, CircuitBreakerRegistry,
    CircuitState,
};

use super::backing::BackingStore;
use super::errors::StoreError;

/// Backing store with every operation routed through a named breaker
#[derive(Clone)]
pub struct ProtectedStore {
    inner: Arc<dyn BackingStore>,
    breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for ProtectedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedStore")
            .field("breaker", &self.breaker.name())
            .finish()
    }
}

impl ProtectedStore {
    /// Wrap a store, creating (or reusing) the named breaker in the
    /// registry with the strict datastore profile.
    pub fn new(
        inner: Arc<dyn BackingStore>,
        registry: &CircuitBreakerRegistry,
        breaker_name: &str,
    ) -> Self {
        let breaker =
            registry.get_or_create_with_profile(breaker_name, CircuitBreakerProfile::datastore());
        Self { inner, breaker }
    }

    /// Current breaker state, for health reporting
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }
}

fn flatten(err: CircuitBreakerError<StoreError>) -> StoreError {
    match err {
        CircuitBreakerError::CircuitOpen { component } => {
            StoreError::Connection(format!("circuit open for {component}"))
        }
        CircuitBreakerError::OperationFailed(inner) => inner,
    }
}

#[async_trait]
impl BackingStore for ProtectedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.breaker
            .execute(|| self.inner.get(key))
            .await
            .map_err(flatten)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.breaker
            .execute(|| self.inner.set(key, value, ttl))
            .await
            .map_err(flatten)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.breaker
            .execute(|| self.inner.delete(key))
            .await
            .map_err(flatten)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        self.breaker
            .execute(|| self.inner.delete_prefix(prefix))
            .await
            .map_err(flatten)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        self.breaker
            .execute(|| self.inner.incr(key, ttl))
            .await
            .map_err(flatten)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        // The probe bypasses the breaker: it is the one call that must reach
        // the substrate while everything else is failing fast.
        self.inner.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backing::InMemoryBackingStore;

    #[tokio::test]
    async fn test_breaker_opens_after_repeated_store_failures() {
        let inner = Arc::new(InMemoryBackingStore::new());
        let registry = CircuitBreakerRegistry::default();
        let protected = ProtectedStore::new(inner.clone(), &registry, "redis");

        inner.set_failing(true);
        // The datastore profile opens after 3 classified failures
        for _ in 0..3 {
            let _ = protected.get("ns:k").await;
        }
        assert_eq!(protected.circuit_state(), CircuitState::Open);

        // Calls now short-circuit without touching the store
        let err = protected.get("ns:k").await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[tokio::test]
    async fn test_ping_bypasses_open_circuit() {
        let inner = Arc::new(InMemoryBackingStore::new());
        let registry = CircuitBreakerRegistry::default();
        let protected = ProtectedStore::new(inner.clone(), &registry, "redis");

        registry.get_or_create("redis").force_open().await;
        assert!(protected.ping().await.is_ok());
    }
}
