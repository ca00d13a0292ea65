//! # Service Health Model
//!
//! Per-dependency health states and the system-wide degradation level
//! derived from them. Transitions are driven by explicit reports from
//! callers, typically wired from circuit breaker transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of one downstream dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unavailable,
}

impl HealthState {
    /// Severity rank used for worst-of aggregation
    fn severity(self) -> u8 {
        match self {
            HealthState::Healthy => 0,
            HealthState::Degraded => 1,
            HealthState::Unavailable => 2,
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Degraded => write!(f, "degraded"),
            HealthState::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// System-wide aggregate: the worst tracked service state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    Normal,
    Degraded,
    Critical,
}

impl DegradationLevel {
    /// Derive the system level from an iterator of service states
    pub fn from_states<I: IntoIterator<Item = HealthState>>(states: I) -> Self {
        let worst = states
            .into_iter()
            .max_by_key(|state| state.severity())
            .unwrap_or(HealthState::Healthy);

        match worst {
            HealthState::Healthy => DegradationLevel::Normal,
            HealthState::Degraded => DegradationLevel::Degraded,
            HealthState::Unavailable => DegradationLevel::Critical,
        }
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradationLevel::Normal => write!(f, "normal"),
            DegradationLevel::Degraded => write!(f, "degraded"),
            DegradationLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Tracked record for one service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service: String,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_transition: DateTime<Utc>,
}

impl ServiceHealth {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            state: HealthState::Healthy,
            consecutive_failures: 0,
            last_transition: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_is_worst_of() {
        let level = DegradationLevel::from_states([HealthState::Healthy, HealthState::Healthy]);
        assert_eq!(level, DegradationLevel::Normal);

        let level = DegradationLevel::from_states([HealthState::Healthy, HealthState::Degraded]);
        assert_eq!(level, DegradationLevel::Degraded);

        let level =
            DegradationLevel::from_states([HealthState::Degraded, HealthState::Unavailable]);
        assert_eq!(level, DegradationLevel::Critical);
    }

    #[test]
    fn test_no_services_means_normal() {
        let level = DegradationLevel::from_states(std::iter::empty());
        assert_eq!(level, DegradationLevel::Normal);
    }
}
