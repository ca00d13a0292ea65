//! # Shared Cache
//!
//! Namespaced hybrid cache with a shared backing store (Redis) as the
//! primary and a local in-memory mirror as the secondary. Each namespace
//! declares its own TTL, entry bound, and eviction policy; reads and writes
//! degrade transparently to the mirror when the substrate is down.

pub mod backing;
pub mod errors;
pub mod memory;
pub mod namespace;
pub mod protected;
pub mod service;

pub use backing::{BackingStore, InMemoryBackingStore, RedisBackingStore};
pub use errors::{CacheError, CacheResult, StoreError};
pub use namespace::{EvictionPolicy, NamespaceConfig, NamespaceStats};
pub use protected::ProtectedStore;
pub use service::{CacheStatsReport, HealthSink, NamespaceReport, SharedCache};
