//! # Circuit Breaker Registry
//!
//! Named factory and lookup over breaker instances, one per external
//! dependency. Each dependency class gets a profile (tolerant for flaky
//! third-party APIs, strict for the primary datastore); `get_or_create` is
//! idempotent so call sites can fetch by name without coordination.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::circuit_breaker::{
    CircuitBreaker, CircuitBreakerProfile, CircuitState, TransitionListener,
};
use super::metrics::SystemCircuitBreakerMetrics;

/// Registry mapping logical dependency names to breaker instances
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,

    /// Profile applied when a name has no explicit override
    default_profile: CircuitBreakerProfile,

    /// Per-name profile overrides, loaded from configuration at startup
    profiles: HashMap<String, CircuitBreakerProfile>,

    /// Listener installed on every breaker, current and future
    listener: parking_lot::RwLock<Option<TransitionListener>>,
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.breakers.len())
            .field("default_profile", &self.default_profile)
            .finish()
    }
}

impl CircuitBreakerRegistry {
    pub fn new(default_profile: CircuitBreakerProfile) -> Self {
        Self {
            breakers: DashMap::new(),
            default_profile,
            profiles: HashMap::new(),
            listener: parking_lot::RwLock::new(None),
        }
    }

    /// Create a registry with per-name profile overrides
    pub fn with_profiles(
        default_profile: CircuitBreakerProfile,
        profiles: HashMap<String, CircuitBreakerProfile>,
    ) -> Self {
        info!(
            override_count = profiles.len(),
            "Circuit breaker registry initialized"
        );
        Self {
            breakers: DashMap::new(),
            default_profile,
            profiles,
            listener: parking_lot::RwLock::new(None),
        }
    }

    /// Build a registry from configuration, converting the default profile
    /// and every per-name override
    pub fn from_config(config: &crate::config::ResilienceConfig) -> Self {
        Self::with_profiles(config.default_profile.profile(), config.profile_map())
    }

    /// Get or create the breaker for a logical dependency name. Idempotent:
    /// the first caller creates, everyone else gets the same instance.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }

        let profile = self
            .profiles
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_profile.clone());
        self.create(name, profile)
    }

    /// Get or create with an explicit profile. The profile only applies when
    /// this call creates the breaker; an existing breaker keeps its own.
    pub fn get_or_create_with_profile(
        &self,
        name: &str,
        profile: CircuitBreakerProfile,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }
        self.create(name, profile)
    }

    fn create(&self, name: &str, profile: CircuitBreakerProfile) -> Arc<CircuitBreaker> {
        let entry = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(breaker = %name, "Creating circuit breaker");
                let breaker = CircuitBreaker::new(name.to_string(), profile);
                if let Some(listener) = self.listener.read().clone() {
                    breaker.set_listener(listener);
                }
                Arc::new(breaker)
            });
        entry.clone()
    }

    /// Look up an existing breaker without creating one
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.clone())
    }

    /// Install a transition listener on every breaker, current and future
    pub fn set_transition_listener(&self, listener: TransitionListener) {
        for entry in self.breakers.iter() {
            entry.value().set_listener(listener.clone());
        }
        *self.listener.write() = Some(listener);
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshot metrics for every registered breaker
    pub async fn metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system = SystemCircuitBreakerMetrics::default();

        let breakers: Vec<(String, Arc<CircuitBreaker>)> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (name, breaker) in breakers {
            let snapshot = breaker.metrics().await;
            match snapshot.current_state {
                CircuitState::Open => system.open_count += 1,
                CircuitState::HalfOpen => system.half_open_count += 1,
                CircuitState::Closed => {}
            }
            system.breakers.insert(name, snapshot);
        }

        system
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerProfile::default())
    }
}
