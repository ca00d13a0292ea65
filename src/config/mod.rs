//! # Configuration Management
//!
//! Typed component configuration with environment-aware YAML loading.
//! Every component receives its own settings struct; `HeraldConfig` is the
//! root the loader deserializes, validates, and hands to the hosting
//! process, which passes the slices down at construction time.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::CircuitBreakerProfile;

pub use loader::ConfigManager;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to read config file {path}: {message}")]
    FileRead { path: String, message: String },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigurationError {
    pub fn file_read(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileRead {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;

/// Root configuration for one shard process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldConfig {
    pub shard: ShardConfig,
    pub redis: RedisConfig,
    pub cache: CacheSettings,
    pub resilience: ResilienceConfig,
    pub degradation: DegradationSettings,
    pub bridge: BridgeSettings,
}

impl HeraldConfig {
    /// Validate cross-field constraints before the config is used
    pub fn validate(&self) -> ConfigResult<()> {
        if self.shard.shard_id.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "shard.shard_id",
                "must not be empty",
            ));
        }
        if self.bridge.channel.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "bridge.channel",
                "must not be empty",
            ));
        }
        if self.cache.sweep_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.sweep_interval_seconds",
                "must be at least 1",
            ));
        }
        if self.degradation.max_queue_entries_per_target == 0 {
            return Err(ConfigurationError::invalid_value(
                "degradation.max_queue_entries_per_target",
                "must be at least 1",
            ));
        }
        if self.degradation.fallback_region == self.degradation.queue_region {
            return Err(ConfigurationError::invalid_value(
                "degradation.queue_region",
                "must differ from fallback_region",
            ));
        }
        Ok(())
    }
}

/// Identity of this worker process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    pub shard_id: String,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            shard_id: "shard-0".to_string(),
        }
    }
}

/// Connection settings for the shared substrate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

/// Cache service settings (namespaces are registered in code at startup)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Interval between expiry sweeps over the local mirrors
    pub sweep_interval_seconds: u64,
    /// Interval between backing-store recovery probes while degraded
    pub probe_interval_seconds: u64,
    /// Service name reported to the degradation manager for the substrate
    pub store_service_name: String,
}

impl CacheSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_seconds.max(1))
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 30,
            probe_interval_seconds: 5,
            store_service_name: "redis".to_string(),
        }
    }
}

/// One breaker profile in config units
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerProfileConfig {
    pub failure_threshold: u32,
    pub reset_timeout_seconds: u64,
    pub success_threshold: u32,
}

impl BreakerProfileConfig {
    pub fn profile(&self) -> CircuitBreakerProfile {
        CircuitBreakerProfile {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_secs(self.reset_timeout_seconds),
            success_threshold: self.success_threshold,
        }
    }
}

impl Default for BreakerProfileConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_seconds: 30,
            success_threshold: 2,
        }
    }
}

/// Circuit breaker defaults plus per-dependency overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub default_profile: BreakerProfileConfig,
    /// Per-dependency-name overrides, e.g. a strict profile for `redis`
    /// and a tolerant one for `twitch_api`
    pub profiles: HashMap<String, BreakerProfileConfig>,
}

impl ResilienceConfig {
    pub fn profile_map(&self) -> HashMap<String, CircuitBreakerProfile> {
        self.profiles
            .iter()
            .map(|(name, config)| (name.clone(), config.profile()))
            .collect()
    }
}

/// Degradation manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationSettings {
    /// Bound per target before oldest-first eviction kicks in
    pub max_queue_entries_per_target: usize,
    /// Replay attempts per write before it moves to the dead letter record
    pub max_replay_retries: u32,
    /// Base delay for exponential replay backoff
    pub replay_backoff_base_ms: u64,
    /// Cache namespace holding last-known-good fallback values
    pub fallback_region: String,
    /// Cache namespace mirroring queued writes for durability
    pub queue_region: String,
    pub fallback_ttl_seconds: u64,
    pub fallback_max_entries: usize,
    /// Capacity of the health-transition broadcast channel
    pub event_capacity: usize,
}

impl DegradationSettings {
    pub fn replay_backoff_base(&self) -> Duration {
        Duration::from_millis(self.replay_backoff_base_ms.max(1))
    }
}

impl Default for DegradationSettings {
    fn default() -> Self {
        Self {
            max_queue_entries_per_target: 500,
            max_replay_retries: 3,
            replay_backoff_base_ms: 250,
            fallback_region: "degradation_fallbacks".to_string(),
            queue_region: "degradation_writes".to_string(),
            fallback_ttl_seconds: 86_400,
            fallback_max_entries: 2_000,
            event_capacity: 256,
        }
    }
}

/// Shard bridge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Well-known pub/sub channel shared by every shard
    pub channel: String,
    /// Timeout applied when a caller does not pass one explicitly
    pub default_timeout_ms: u64,
    /// Interval between sweeps of expired pending correlations
    pub reaper_interval_ms: u64,
}

impl BridgeSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms.max(1))
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms.max(1))
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            channel: "herald:bridge".to_string(),
            default_timeout_ms: 5_000,
            reaper_interval_ms: 1_000,
        }
    }
}
