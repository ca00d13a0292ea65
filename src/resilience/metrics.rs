//! # Circuit Breaker Metrics
//!
//! Per-breaker counters and registry-wide aggregation snapshots.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::circuit_breaker::CircuitState;

/// Metrics tracked for a single circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Errors classified as business outcomes; never move the breaker
    pub business_outcomes: u64,
    pub consecutive_failures: u64,
    pub half_open_successes: u64,
    pub rejected_calls: u64,
    #[serde(skip)]
    pub total_duration: Duration,
    pub current_state: CircuitState,
    pub failure_rate: f64,
    pub success_rate: f64,
    #[serde(skip)]
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            business_outcomes: 0,
            consecutive_failures: 0,
            half_open_successes: 0,
            rejected_calls: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry-wide metrics snapshot keyed by breaker name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    pub breakers: HashMap<String, CircuitBreakerMetrics>,
    pub open_count: usize,
    pub half_open_count: usize,
}

impl SystemCircuitBreakerMetrics {
    /// True when no breaker is open or half-open
    pub fn all_closed(&self) -> bool {
        self.open_count == 0 && self.half_open_count == 0
    }
}
