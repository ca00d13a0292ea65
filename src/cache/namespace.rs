//! # Namespace Configuration and Counters
//!
//! A namespace is a named, independently configured region of the cache:
//! its own TTL default, entry bound, eviction policy, and hit/miss counters.
//! Namespaces are registered once at startup; every cache operation
//! addresses exactly one registered namespace and fails fast otherwise.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How a namespace sheds entries once `max_entries` is reached.
///
/// The policy is declared at registration and implemented exactly as named:
/// `Fifo` evicts in insertion order and never reorders on read; `Lru`
/// touches a recency marker on every read and evicts the least recently
/// used. `Fifo` is the default - `Lru` pays a write per read and is only
/// worth it for namespaces with strong access skew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    #[default]
    Fifo,
    Lru,
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionPolicy::Fifo => write!(f, "fifo"),
            EvictionPolicy::Lru => write!(f, "lru"),
        }
    }
}

/// Immutable configuration for one cache namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Default entry lifetime in seconds, applied unless a call overrides it
    pub ttl_seconds: u64,

    /// Maximum number of entries held in the local mirror
    pub max_entries: usize,

    /// Whether reads and writes go through the shared backing store
    pub use_backing_store: bool,

    /// Eviction policy enforced on the local mirror
    #[serde(default)]
    pub eviction: EvictionPolicy,
}

impl NamespaceConfig {
    pub fn new(ttl_seconds: u64, max_entries: usize, use_backing_store: bool) -> Self {
        Self {
            ttl_seconds,
            max_entries,
            use_backing_store,
            eviction: EvictionPolicy::Fifo,
        }
    }

    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Default TTL as a [`Duration`], floored at one second to stay
    /// compatible with Redis SETEX semantics
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds.max(1))
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            max_entries: 1_000,
            use_backing_store: true,
            eviction: EvictionPolicy::Fifo,
        }
    }
}

/// Mutable per-namespace counters, updated lock-free on the hot path
#[derive(Debug, Default)]
pub struct NamespaceCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    /// Absences observed via `peek`; tallied apart from regular misses
    pub peek_absences: AtomicU64,
    /// Counter-style operations (`increment`) that always succeed
    pub counter_ops: AtomicU64,
}

impl NamespaceCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_peek_absence(&self) {
        self.peek_absences.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_counter_op(&self) {
        self.counter_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> NamespaceStats {
        NamespaceStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            peek_absences: self.peek_absences.load(Ordering::Relaxed),
            counter_ops: self.counter_ops.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter snapshot for one namespace
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub peek_absences: u64,
    pub counter_ops: u64,
}

impl NamespaceStats {
    /// Classic hit rate over `get` traffic only
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_floor() {
        let config = NamespaceConfig::new(0, 10, false);
        assert_eq!(config.ttl(), Duration::from_secs(1));
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = NamespaceCounters::default();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        counters.record_eviction(3);
        counters.record_peek_absence();
        counters.record_counter_op();

        let stats = counters.snapshot();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 3);
        assert_eq!(stats.peek_absences, 1);
        assert_eq!(stats.counter_ops, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_eviction_policy_serde() {
        let yaml = "eviction: lru\nttl_seconds: 60\nmax_entries: 100\nuse_backing_store: false";
        let config: NamespaceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.eviction, EvictionPolicy::Lru);
    }
}
