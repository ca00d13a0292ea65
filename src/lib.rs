#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Herald Core Rust
//!
//! Resilience and shared-state core for the Herald chat-automation backend.
//!
//! ## Overview
//!
//! Herald runs as multiple independent worker processes ("shards"), each
//! owning a disjoint subset of connected communities. No single process sees
//! the whole world, so any state that must be consistent across shards -
//! rate limits, moderation cooldowns, cached API results, cross-process
//! statistics - is coordinated through a shared Redis substrate with
//! graceful handling of that substrate's failure.
//!
//! This crate is the layer every feature depends on. Feature logic (command
//! parsing, moderation rules, playback queues) lives elsewhere and consumes
//! four interfaces:
//!
//! - [`cache::SharedCache`] - namespaced hybrid cache: Redis primary,
//!   local in-memory mirror secondary, per-namespace TTL, entry bounds, and
//!   declared eviction policy
//! - [`resilience::CircuitBreakerRegistry`] - named circuit breakers with
//!   per-dependency profiles and classification-before-counting
//! - [`degradation::DegradationManager`] - per-service health, worst-of
//!   system level, fallback values, and a replayed write-intent queue
//! - [`bridge::ShardBridge`] - request/response and broadcast messaging
//!   between shards over one pub/sub channel
//!
//! ## Wiring
//!
//! Components are explicit values constructed once at startup and passed by
//! `Arc` - no hidden module-level singletons, so tests build isolated
//! instances freely.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use herald_core::cache::{InMemoryBackingStore, NamespaceConfig, SharedCache};
//! use herald_core::config::HeraldConfig;
//! use herald_core::degradation::DegradationManager;
//! use herald_core::resilience::CircuitBreakerRegistry;
//!
//! # async fn example() {
//! let config = HeraldConfig::default();
//!
//! let backing = Arc::new(InMemoryBackingStore::new());
//! let cache = SharedCache::new(backing, config.cache.clone());
//! cache.register_namespace("api_responses", NamespaceConfig::new(300, 5_000, true));
//!
//! let registry = Arc::new(CircuitBreakerRegistry::from_config(&config.resilience));
//! let degradation = DegradationManager::new(cache.clone(), config.degradation.clone());
//! cache.set_health_sink(degradation.clone());
//!
//! cache.initialize().await;
//! degradation.initialize().await;
//! # }
//! ```

pub mod bridge;
pub mod cache;
pub mod config;
pub mod degradation;
pub mod error;
pub mod events;
pub mod logging;
pub mod resilience;

pub use bridge::{BridgeError, DispatchTable, ShardBridge, ShardMessage, ShardTarget};
pub use cache::{CacheError, EvictionPolicy, NamespaceConfig, SharedCache};
pub use config::{ConfigManager, HeraldConfig};
pub use degradation::{DegradationLevel, DegradationManager, HealthState};
pub use error::{HeraldError, Result};
pub use resilience::{CircuitBreakerProfile, CircuitBreakerRegistry, CircuitState};
