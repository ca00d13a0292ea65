//! # Circuit Breaker Implementation
//!
//! Fault isolation for outbound calls from a shard. Classic three-state
//! breaker: Closed (normal operation), Open (failing fast), and HalfOpen
//! (bounded trial calls probing recovery).
//!
//! Error classification happens BEFORE any counter moves: an error is first
//! run through [`FailureClassification`], and only infrastructure failures
//! increment the failure streak and arm the open-threshold check. Business
//! outcomes (not-found, rate-limited, validation) pass through untouched no
//! matter how often they occur.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::classification::FailureClassification;
use super::metrics::CircuitBreakerMetrics;

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited trial calls allowed through
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

/// Thresholds and timeouts for one breaker, chosen per dependency class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerProfile {
    /// Classified failures required to open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing trial calls
    pub reset_timeout: Duration,
    /// Consecutive trial successes required to close from half-open
    pub success_threshold: u32,
}

impl CircuitBreakerProfile {
    /// Strict profile for the primary datastore: open early, retry soon
    pub fn datastore() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(15),
            success_threshold: 2,
        }
    }

    /// Tolerant profile for flaky third-party APIs
    pub fn external_api() -> Self {
        Self {
            failure_threshold: 8,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }
    }
}

impl Default for CircuitBreakerProfile {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and the outcome was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Called when a breaker changes state; wired by the registry so the host
/// can feed transitions into the degradation manager
pub type TransitionListener = Arc<dyn Fn(&str, CircuitState) + Send + Sync>;

/// Core circuit breaker with atomic state management
pub struct CircuitBreaker {
    /// Breaker name for logging and metrics
    name: String,

    /// Current circuit state (atomic for thread safety)
    state: AtomicU8,

    /// Thresholds and timeouts
    profile: CircuitBreakerProfile,

    /// Metrics tracking protected by mutex
    metrics: Arc<Mutex<CircuitBreakerMetrics>>,

    /// Time when the circuit was opened, gating the reset timeout
    opened_at: Arc<Mutex<Option<Instant>>>,

    /// Optional state-transition listener
    listener: parking_lot::RwLock<Option<TransitionListener>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("profile", &self.profile)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and profile
    pub fn new(name: String, profile: CircuitBreakerProfile) -> Self {
        info!(
            breaker = %name,
            failure_threshold = profile.failure_threshold,
            reset_timeout_seconds = profile.reset_timeout.as_secs(),
            success_threshold = profile.success_threshold,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            profile,
            metrics: Arc::new(Mutex::new(CircuitBreakerMetrics::new())),
            opened_at: Arc::new(Mutex::new(None)),
            listener: parking_lot::RwLock::new(None),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Get breaker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install a state-transition listener
    pub fn set_listener(&self, listener: TransitionListener) {
        *self.listener.write() = Some(listener);
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// When the circuit is open and the reset timeout has not elapsed the
    /// operation is not invoked and `CircuitOpen` is returned. Errors from
    /// the operation are classified before counting.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureClassification,
    {
        if !self.should_allow_call().await {
            let mut metrics = self.metrics.lock().await;
            metrics.rejected_calls += 1;
            drop(metrics);

            debug!(breaker = %self.name, "Call rejected while circuit open");
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();

        match &result {
            Ok(_) => {
                self.record_success(duration).await;
            }
            Err(err) => {
                // Classification precedes counting; a business outcome must
                // never move the breaker.
                if err.is_infrastructure_failure() {
                    self.record_failure(duration).await;
                } else {
                    self.record_business_outcome(duration).await;
                }
            }
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Execute with a fallback that runs when the circuit is open or the
    /// operation fails. The caller either gets the operation's value, the
    /// fallback's result, or the fallback's own error.
    pub async fn execute_with_fallback<F, Fut, FB, FbFut, T, E>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
        E: FailureClassification,
    {
        match self.execute(operation).await {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::CircuitOpen { .. }) => {
                debug!(breaker = %self.name, "Circuit open, running fallback");
                fallback().await
            }
            Err(CircuitBreakerError::OperationFailed(_)) => fallback().await,
        }
    }

    /// Check if a call should be allowed based on current state
    async fn should_allow_call(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = self.opened_at.lock().await;
                if let Some(opened_time) = *opened_at {
                    if opened_time.elapsed() >= self.profile.reset_timeout {
                        drop(opened_at);
                        self.transition_to_half_open().await;
                        true
                    } else {
                        false
                    }
                } else {
                    // Open without a timestamp - shouldn't happen, allow call
                    warn!(breaker = %self.name, "Circuit open but no timestamp recorded");
                    true
                }
            }
            CircuitState::HalfOpen => {
                let metrics = self.metrics.lock().await;
                metrics.half_open_successes < self.profile.success_threshold as u64
            }
        }
    }

    async fn record_success(&self, duration: Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.success_count += 1;
        metrics.total_duration += duration;

        match self.state() {
            CircuitState::HalfOpen => {
                metrics.half_open_successes += 1;
                if metrics.half_open_successes >= self.profile.success_threshold as u64 {
                    drop(metrics);
                    self.transition_to_closed().await;
                }
            }
            CircuitState::Closed => {
                metrics.consecutive_failures = 0;
            }
            CircuitState::Open => {
                warn!(breaker = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    async fn record_failure(&self, duration: Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.failure_count += 1;
        metrics.total_duration += duration;

        error!(
            breaker = %self.name,
            duration_ms = duration.as_millis(),
            "🔴 Protected operation failed"
        );

        match self.state() {
            CircuitState::Closed => {
                metrics.consecutive_failures += 1;
                if metrics.consecutive_failures >= self.profile.failure_threshold as u64 {
                    drop(metrics);
                    self.transition_to_open().await;
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open immediately reopens the circuit
                drop(metrics);
                self.transition_to_open().await;
            }
            CircuitState::Open => {}
        }
    }

    async fn record_business_outcome(&self, duration: Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.business_outcomes += 1;
        metrics.total_duration += duration;

        debug!(
            breaker = %self.name,
            "Business outcome passed through without counting"
        );
    }

    async fn transition_to_closed(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);

        let mut metrics = self.metrics.lock().await;
        metrics.consecutive_failures = 0;
        metrics.half_open_successes = 0;
        drop(metrics);

        let mut opened_at = self.opened_at.lock().await;
        *opened_at = None;
        drop(opened_at);

        info!(breaker = %self.name, "🟢 Circuit breaker closed (recovered)");
        self.notify(CircuitState::Closed);
    }

    async fn transition_to_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        // Record the open timestamp gating the reset timeout. A failure in
        // half-open lands here too, which restarts the clock.
        let mut opened_at = self.opened_at.lock().await;
        *opened_at = Some(Instant::now());
        drop(opened_at);

        let mut metrics = self.metrics.lock().await;
        metrics.half_open_successes = 0;
        let consecutive = metrics.consecutive_failures;
        drop(metrics);

        error!(
            breaker = %self.name,
            consecutive_failures = consecutive,
            failure_threshold = self.profile.failure_threshold,
            reset_timeout_seconds = self.profile.reset_timeout.as_secs(),
            "🔴 Circuit breaker opened (failing fast)"
        );
        self.notify(CircuitState::Open);
    }

    async fn transition_to_half_open(&self) {
        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);

        let mut metrics = self.metrics.lock().await;
        metrics.half_open_successes = 0;
        drop(metrics);

        info!(
            breaker = %self.name,
            success_threshold = self.profile.success_threshold,
            "🟡 Circuit breaker half-open (testing recovery)"
        );
        self.notify(CircuitState::HalfOpen);
    }

    fn notify(&self, state: CircuitState) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener(&self.name, state);
        }
    }

    /// Force circuit to open state (emergency stop)
    pub async fn force_open(&self) {
        warn!(breaker = %self.name, "🚨 Circuit breaker forced open");
        self.transition_to_open().await;
    }

    /// Force circuit to closed state (emergency recovery)
    pub async fn force_closed(&self) {
        warn!(breaker = %self.name, "🚨 Circuit breaker forced closed");
        self.transition_to_closed().await;
    }

    /// Get current metrics snapshot with derived rates
    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        let metrics = self.metrics.lock().await;
        let mut snapshot = metrics.clone();
        snapshot.current_state = self.state();

        if metrics.total_calls > 0 {
            snapshot.failure_rate = metrics.failure_count as f64 / metrics.total_calls as f64;
            snapshot.success_rate = metrics.success_count as f64 / metrics.total_calls as f64;

            if metrics.success_count > 0 {
                snapshot.average_duration = metrics.total_duration / metrics.success_count as u32;
            }
        }

        snapshot
    }

    /// Check if circuit is healthy (closed with a low failure rate)
    pub async fn is_healthy(&self) -> bool {
        if self.state() != CircuitState::Closed {
            return false;
        }

        let metrics = self.metrics.lock().await;
        if metrics.total_calls < 10 {
            // Too few calls to judge
            return true;
        }

        let failure_rate = metrics.failure_count as f64 / metrics.total_calls as f64;
        failure_rate < 0.1
    }
}
