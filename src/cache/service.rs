//! # Shared Cache Service
//!
//! Namespaced hybrid cache: a shared backing store (Redis) as the primary
//! with a local in-memory mirror as the secondary. When the backing store is
//! unreachable, reads and writes transparently degrade to the mirror for
//! that call, the failure is reported to the degradation manager, and a
//! periodic probe restores backing-store usage once it recovers.
//!
//! Every operation addresses a registered namespace; unregistered
//! namespaces fail fast rather than silently defaulting.

use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CacheSettings;

use super::backing::BackingStore;
use super::errors::{CacheError, CacheResult};
use super::memory::MemoryRegion;
use super::namespace::{NamespaceConfig, NamespaceCounters, NamespaceStats};

/// Where the cache reports substrate failures and recoveries. Implemented
/// by the degradation manager; a seam rather than a direct dependency so
/// isolated caches can be built in tests.
pub trait HealthSink: Send + Sync {
    fn report_healthy(&self, service: &str);
    fn report_unavailable(&self, service: &str);
}

#[derive(Debug)]
struct NamespaceState {
    config: NamespaceConfig,
    counters: NamespaceCounters,
    region: parking_lot::Mutex<MemoryRegion>,
}

impl NamespaceState {
    fn new(config: NamespaceConfig) -> Self {
        let region = MemoryRegion::new(config.eviction, config.max_entries);
        Self {
            config,
            counters: NamespaceCounters::default(),
            region: parking_lot::Mutex::new(region),
        }
    }
}

/// Per-namespace slice of a stats report
#[derive(Debug, Clone, serde::Serialize)]
pub struct NamespaceReport {
    pub policy: String,
    pub entries: usize,
    #[serde(flatten)]
    pub counters: NamespaceStats,
}

/// Cache-wide stats report
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsReport {
    pub namespaces: std::collections::HashMap<String, NamespaceReport>,
    /// Hit rate crediting counter-style operations, which always succeed
    /// semantically even though they are not classic reads
    pub effective_hit_rate: f64,
    pub store_failures: u64,
    pub backing_available: bool,
}

/// The namespaced hybrid cache shared by every feature on a shard
pub struct SharedCache {
    namespaces: DashMap<String, Arc<NamespaceState>>,
    backing: Option<Arc<dyn BackingStore>>,
    backing_available: Arc<AtomicBool>,
    inflight: DashMap<String, Arc<OnceCell<CacheResult<Value>>>>,
    health_sink: parking_lot::RwLock<Option<Arc<dyn HealthSink>>>,
    settings: CacheSettings,
    store_failures: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCache")
            .field("namespaces", &self.namespaces.len())
            .field("backing_available", &self.backing_available)
            .finish()
    }
}

impl SharedCache {
    /// Create a cache with a shared backing store
    pub fn new(backing: Arc<dyn BackingStore>, settings: CacheSettings) -> Arc<Self> {
        Self::build(Some(backing), settings)
    }

    /// Create a purely local cache (tests, single-process tools)
    pub fn local(settings: CacheSettings) -> Arc<Self> {
        Self::build(None, settings)
    }

    fn build(backing: Option<Arc<dyn BackingStore>>, settings: CacheSettings) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            namespaces: DashMap::new(),
            backing,
            backing_available: Arc::new(AtomicBool::new(true)),
            inflight: DashMap::new(),
            health_sink: parking_lot::RwLock::new(None),
            settings,
            store_failures: AtomicU64::new(0),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Wire the sink that receives substrate health reports
    pub fn set_health_sink(&self, sink: Arc<dyn HealthSink>) {
        *self.health_sink.write() = Some(sink);
    }

    /// Register a namespace. Must precede first use; re-registration
    /// overwrites the configuration and resets the region (startup only).
    pub fn register_namespace(&self, name: &str, config: NamespaceConfig) {
        debug!(
            namespace = %name,
            ttl_seconds = config.ttl_seconds,
            max_entries = config.max_entries,
            policy = %config.eviction,
            use_backing_store = config.use_backing_store,
            "Registering cache namespace"
        );
        self.namespaces
            .insert(name.to_string(), Arc::new(NamespaceState::new(config)));
    }

    pub fn namespace_registered(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    fn state(&self, namespace: &str) -> CacheResult<Arc<NamespaceState>> {
        self.namespaces
            .get(namespace)
            .map(|entry| entry.clone())
            .ok_or_else(|| CacheError::unregistered(namespace))
    }

    fn backing_for(&self, state: &NamespaceState) -> Option<Arc<dyn BackingStore>> {
        if !state.config.use_backing_store {
            return None;
        }
        if !self.backing_available.load(Ordering::Acquire) {
            return None;
        }
        self.backing.clone()
    }

    fn store_key(namespace: &str, key: &str) -> String {
        format!("{namespace}:{key}")
    }

    fn note_store_failure(&self, context: &str, err: &super::errors::StoreError) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
        let was_available = self.backing_available.swap(false, Ordering::AcqRel);
        if was_available {
            warn!(
                operation = context,
                error = %err,
                "Backing store unavailable, degrading to local mirror"
            );
            if let Some(sink) = self.health_sink.read().clone() {
                sink.report_unavailable(&self.settings.store_service_name);
            }
        }
    }

    // ---- Core operations -------------------------------------------------

    /// Read a value: backing store first when enabled, else the local
    /// mirror. Records a hit or a miss.
    pub async fn get(&self, namespace: &str, key: &str) -> CacheResult<Option<Value>> {
        let state = self.state(namespace)?;

        if let Some(backing) = self.backing_for(&state) {
            match backing.get(&Self::store_key(namespace, key)).await {
                Ok(Some(raw)) => {
                    let value: Value = serde_json::from_str(&raw).map_err(|e| {
                        CacheError::serialization(namespace, key, e.to_string())
                    })?;
                    // Warm the mirror so a later outage still has this value
                    state
                        .region
                        .lock()
                        .insert(key, value.clone(), state.config.ttl());
                    state.counters.record_hit();
                    return Ok(Some(value));
                }
                Ok(None) => {
                    state.counters.record_miss();
                    return Ok(None);
                }
                Err(err) => {
                    self.note_store_failure("get", &err);
                    // Fall through to the local mirror for this call
                }
            }
        }

        let value = state.region.lock().get(key);
        match value {
            Some(value) => {
                state.counters.record_hit();
                Ok(Some(value))
            }
            None => {
                state.counters.record_miss();
                Ok(None)
            }
        }
    }

    /// Write a value to the backing store (when enabled) and always to the
    /// local mirror. A backing-store failure retains the value locally and
    /// is reported to the health sink, not surfaced to the caller.
    pub async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        ttl_override: Option<Duration>,
    ) -> CacheResult<()> {
        let state = self.state(namespace)?;
        let ttl = ttl_override.unwrap_or_else(|| state.config.ttl());

        let evicted = state.region.lock().insert(key, value.clone(), ttl);
        if evicted > 0 {
            state.counters.record_eviction(evicted);
        }

        if let Some(backing) = self.backing_for(&state) {
            let raw = serde_json::to_string(&value)
                .map_err(|e| CacheError::serialization(namespace, key, e.to_string()))?;
            if let Err(err) = backing.set(&Self::store_key(namespace, key), &raw, ttl).await {
                self.note_store_failure("set", &err);
            }
        }

        Ok(())
    }

    /// Single-flight read-through: concurrent callers for the same key wait
    /// for the one in-flight producer instead of re-invoking it, and the
    /// produced value populates the cache before anyone returns. The miss
    /// that triggers the producer is a genuine miss and is counted.
    pub async fn get_or_set<F, Fut, E>(
        &self,
        namespace: &str,
        key: &str,
        producer: F,
        ttl_override: Option<Duration>,
    ) -> CacheResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
        E: std::fmt::Display,
    {
        if let Some(value) = self.get(namespace, key).await? {
            return Ok(value);
        }

        let flight_key = Self::store_key(namespace, key);
        let cell = self
            .inflight
            .entry(flight_key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_init(|| async {
                match producer().await {
                    Ok(value) => {
                        if let Err(err) = self
                            .set(namespace, key, value.clone(), ttl_override)
                            .await
                        {
                            return Err(err);
                        }
                        Ok(value)
                    }
                    Err(err) => Err(CacheError::producer(namespace, key, err.to_string())),
                }
            })
            .await
            .clone();

        // Only clear our own cell; a later producer may already occupy the slot
        self.inflight
            .remove_if(&flight_key, |_, current| Arc::ptr_eq(current, &cell));
        result
    }

    /// Existence-style read that never counts a regular miss; absence is
    /// tallied separately because it is an expected, frequent outcome for
    /// checks like "is this user on cooldown".
    pub async fn peek(&self, namespace: &str, key: &str) -> CacheResult<Option<Value>> {
        let state = self.state(namespace)?;

        if let Some(backing) = self.backing_for(&state) {
            match backing.get(&Self::store_key(namespace, key)).await {
                Ok(Some(raw)) => {
                    let value: Value = serde_json::from_str(&raw).map_err(|e| {
                        CacheError::serialization(namespace, key, e.to_string())
                    })?;
                    return Ok(Some(value));
                }
                Ok(None) => {
                    state.counters.record_peek_absence();
                    return Ok(None);
                }
                Err(err) => {
                    self.note_store_failure("peek", &err);
                }
            }
        }

        let value = state.region.lock().peek(key);
        if value.is_none() {
            state.counters.record_peek_absence();
        }
        Ok(value)
    }

    /// Counter-style operation for cooldown and rate-limit bookkeeping.
    /// Always semantically succeeds; credited by the effective hit rate.
    pub async fn increment(
        &self,
        namespace: &str,
        key: &str,
        ttl_override: Option<Duration>,
    ) -> CacheResult<i64> {
        let state = self.state(namespace)?;
        let ttl = ttl_override.unwrap_or_else(|| state.config.ttl());
        state.counters.record_counter_op();

        if let Some(backing) = self.backing_for(&state) {
            match backing.incr(&Self::store_key(namespace, key), ttl).await {
                Ok(count) => {
                    state
                        .region
                        .lock()
                        .insert(key, Value::from(count), ttl);
                    return Ok(count);
                }
                Err(err) => {
                    self.note_store_failure("increment", &err);
                }
            }
        }

        let mut region = state.region.lock();
        let current = region
            .get(key)
            .and_then(|value| value.as_i64())
            .unwrap_or(0);
        let next = current + 1;
        region.insert(key, Value::from(next), ttl);
        Ok(next)
    }

    pub async fn delete(&self, namespace: &str, key: &str) -> CacheResult<()> {
        let state = self.state(namespace)?;
        state.region.lock().remove(key);

        if let Some(backing) = self.backing_for(&state) {
            if let Err(err) = backing.delete(&Self::store_key(namespace, key)).await {
                self.note_store_failure("delete", &err);
            }
        }
        Ok(())
    }

    /// Delete every key with the given prefix, strictly within the
    /// addressed namespace.
    pub async fn delete_by_prefix(&self, namespace: &str, prefix: &str) -> CacheResult<u64> {
        let state = self.state(namespace)?;
        let local_removed = state.region.lock().remove_prefix(prefix);

        let mut remote_removed = 0;
        if let Some(backing) = self.backing_for(&state) {
            match backing
                .delete_prefix(&Self::store_key(namespace, prefix))
                .await
            {
                Ok(count) => remote_removed = count,
                Err(err) => self.note_store_failure("delete_by_prefix", &err),
            }
        }

        Ok(local_removed.max(remote_removed))
    }

    /// Remove every entry in a namespace. Other namespaces are untouched:
    /// the backing-store prefix is `<namespace>:` and the mirror is
    /// per-namespace by construction.
    pub async fn clear_namespace(&self, namespace: &str) -> CacheResult<u64> {
        let state = self.state(namespace)?;
        let local_removed = state.region.lock().clear();

        let mut remote_removed = 0;
        if let Some(backing) = self.backing_for(&state) {
            match backing.delete_prefix(&format!("{namespace}:")).await {
                Ok(count) => remote_removed = count,
                Err(err) => self.note_store_failure("clear_namespace", &err),
            }
        }

        Ok(local_removed.max(remote_removed))
    }

    // ---- Typed conveniences ----------------------------------------------

    pub async fn get_typed<T: serde::de::DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> CacheResult<Option<T>> {
        match self.get(namespace, key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| CacheError::serialization(namespace, key, e.to_string())),
            None => Ok(None),
        }
    }

    pub async fn set_typed<T: serde::Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl_override: Option<Duration>,
    ) -> CacheResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| CacheError::serialization(namespace, key, e.to_string()))?;
        self.set(namespace, key, value, ttl_override).await
    }

    // ---- Stats -----------------------------------------------------------

    pub fn stats(&self) -> CacheStatsReport {
        let mut namespaces = std::collections::HashMap::new();
        let mut credited_hits = 0u64;
        let mut total_reads = 0u64;

        for entry in self.namespaces.iter() {
            let state = entry.value();
            let counters = state.counters.snapshot();
            credited_hits += counters.hits + counters.counter_ops;
            total_reads += counters.hits + counters.misses + counters.counter_ops;

            namespaces.insert(
                entry.key().clone(),
                NamespaceReport {
                    policy: state.config.eviction.to_string(),
                    entries: state.region.lock().len(),
                    counters,
                },
            );
        }

        let effective_hit_rate = if total_reads == 0 {
            0.0
        } else {
            credited_hits as f64 / total_reads as f64
        };

        CacheStatsReport {
            namespaces,
            effective_hit_rate,
            store_failures: self.store_failures.load(Ordering::Relaxed),
            backing_available: self.backing_available.load(Ordering::Acquire),
        }
    }

    /// True when the backing store is currently considered reachable
    pub fn backing_available(&self) -> bool {
        self.backing_available.load(Ordering::Acquire)
    }

    // ---- Lifecycle -------------------------------------------------------

    /// Start the expiry sweep and the backing-store recovery probe. Called
    /// once by the hosting process.
    pub async fn initialize(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;

        // One periodic sweep over entries bounds timer overhead at scale
        let sweeper = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let sweep_interval = self.settings.sweep_interval();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let mut swept = 0u64;
                        for entry in sweeper.namespaces.iter() {
                            swept += entry.value().region.lock().sweep();
                        }
                        if swept > 0 {
                            debug!(swept, "Expiry sweep removed entries");
                        }
                    }
                }
            }
        }));

        if let Some(backing) = self.backing.clone() {
            let prober = Arc::clone(self);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let probe_interval = self.settings.probe_interval();
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(probe_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = ticker.tick() => {
                            if prober.backing_available.load(Ordering::Acquire) {
                                continue;
                            }
                            match backing.ping().await {
                                Ok(()) => {
                                    prober.backing_available.store(true, Ordering::Release);
                                    info!("Backing store recovered, resuming shared reads");
                                    if let Some(sink) = prober.health_sink.read().clone() {
                                        sink.report_healthy(&prober.settings.store_service_name);
                                    }
                                }
                                Err(err) => {
                                    debug!(error = %err, "Backing store still unreachable");
                                }
                            }
                        }
                    }
                }
            }));
        }

        info!("Shared cache initialized");
    }

    /// Stop background tasks
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut tasks = self.tasks.lock().await;
        for handle in tasks.drain(..) {
            let _ = handle.await;
        }
    }
}

/// The narrow store seam the degradation manager depends on
#[async_trait::async_trait]
impl crate::degradation::StateStore for SharedCache {
    fn register_region(&self, region: &str, ttl_seconds: u64, max_entries: usize) {
        if !self.namespace_registered(region) {
            self.register_namespace(region, NamespaceConfig::new(ttl_seconds, max_entries, true));
        }
    }

    async fn put(&self, region: &str, key: &str, value: Value) -> CacheResult<()> {
        self.set(region, key, value, None).await
    }

    async fn fetch(&self, region: &str, key: &str) -> CacheResult<Option<Value>> {
        // peek: absence is an expected outcome for degradation state
        self.peek(region, key).await
    }

    async fn remove(&self, region: &str, key: &str) -> CacheResult<()> {
        self.delete(region, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backing::InMemoryBackingStore;
    use crate::cache::namespace::EvictionPolicy;
    use serde_json::json;

    fn local_cache() -> Arc<SharedCache> {
        SharedCache::local(CacheSettings::default())
    }

    #[tokio::test]
    async fn test_unregistered_namespace_fails_fast() {
        let cache = local_cache();
        let result = cache.get("nope", "key").await;
        assert!(matches!(
            result,
            Err(CacheError::UnregisteredNamespace { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_get_round_trip_local() {
        let cache = local_cache();
        cache.register_namespace("guild_settings", NamespaceConfig::new(60, 100, false));

        cache
            .set("guild_settings", "42", json!({"prefix": "!"}), None)
            .await
            .unwrap();
        let value = cache.get("guild_settings", "42").await.unwrap();
        assert_eq!(value, Some(json!({"prefix": "!"})));
    }

    #[tokio::test]
    async fn test_backing_store_write_and_warm_mirror() {
        let backing = Arc::new(InMemoryBackingStore::new());
        let cache = SharedCache::new(backing.clone(), CacheSettings::default());
        cache.register_namespace("api_responses", NamespaceConfig::new(60, 100, true));

        cache
            .set("api_responses", "user:7", json!({"name": "ana"}), None)
            .await
            .unwrap();

        // Written under the <namespace>:<key> scheme
        let raw = backing.get("api_responses:user:7").await.unwrap().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&raw).unwrap(),
            json!({"name": "ana"})
        );
    }

    #[tokio::test]
    async fn test_outage_degrades_to_mirror_and_reports() {
        use std::sync::atomic::AtomicUsize;

        #[derive(Default)]
        struct CountingSink {
            unavailable: AtomicUsize,
        }
        impl HealthSink for CountingSink {
            fn report_healthy(&self, _service: &str) {}
            fn report_unavailable(&self, _service: &str) {
                self.unavailable.fetch_add(1, Ordering::SeqCst);
            }
        }

        let backing = Arc::new(InMemoryBackingStore::new());
        let cache = SharedCache::new(backing.clone(), CacheSettings::default());
        let sink = Arc::new(CountingSink::default());
        cache.set_health_sink(sink.clone());
        cache.register_namespace("api_responses", NamespaceConfig::new(60, 100, true));

        cache
            .set("api_responses", "k", json!("warm"), None)
            .await
            .unwrap();

        backing.set_failing(true);

        // Write during the outage is retained locally and surfaces no error
        cache
            .set("api_responses", "k2", json!("local-only"), None)
            .await
            .unwrap();

        // Read falls back to the mirror
        let value = cache.get("api_responses", "k").await.unwrap();
        assert_eq!(value, Some(json!("warm")));
        let value = cache.get("api_responses", "k2").await.unwrap();
        assert_eq!(value, Some(json!("local-only")));

        assert_eq!(sink.unavailable.load(Ordering::SeqCst), 1);
        assert!(!cache.backing_available());
    }

    #[tokio::test]
    async fn test_get_or_set_single_flight() {
        use std::sync::atomic::AtomicUsize;

        let cache = local_cache();
        cache.register_namespace("api_responses", NamespaceConfig::new(60, 100, false));

        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_set(
                        "api_responses",
                        "expensive",
                        || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, CacheError>(json!({"result": 99}))
                        },
                        None,
                    )
                    .await
            }));
        }

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(value, json!({"result": 99}));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_set_producer_error_shared() {
        let cache = local_cache();
        cache.register_namespace("api_responses", NamespaceConfig::new(60, 100, false));

        let result = cache
            .get_or_set(
                "api_responses",
                "broken",
                || async { Err::<Value, _>(CacheError::store("upstream 500")) },
                None,
            )
            .await;
        assert!(matches!(result, Err(CacheError::Producer { .. })));

        // Nothing cached; a later call can retry
        assert_eq!(cache.get("api_responses", "broken").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_peek_absence_is_not_a_miss() {
        let cache = local_cache();
        cache.register_namespace("cooldowns", NamespaceConfig::new(60, 100, false));

        assert!(cache.peek("cooldowns", "user:1").await.unwrap().is_none());

        let stats = cache.stats();
        let ns = &stats.namespaces["cooldowns"];
        assert_eq!(ns.counters.misses, 0);
        assert_eq!(ns.counters.peek_absences, 1);
    }

    #[tokio::test]
    async fn test_increment_counts_toward_effective_rate() {
        let cache = local_cache();
        cache.register_namespace("cooldowns", NamespaceConfig::new(60, 100, false));

        assert_eq!(cache.increment("cooldowns", "user:1", None).await.unwrap(), 1);
        assert_eq!(cache.increment("cooldowns", "user:1", None).await.unwrap(), 2);

        // One plain miss plus two counter ops: effective rate credits the ops
        let _ = cache.get("cooldowns", "other").await.unwrap();
        let stats = cache.stats();
        assert!((stats.effective_hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct GuildSettings {
            prefix: String,
            mod_log: bool,
        }

        let cache = local_cache();
        cache.register_namespace("guild_settings", NamespaceConfig::new(60, 100, false));

        let settings = GuildSettings {
            prefix: "!".to_string(),
            mod_log: true,
        };
        cache
            .set_typed("guild_settings", "42", &settings, None)
            .await
            .unwrap();

        let loaded: GuildSettings = cache
            .get_typed("guild_settings", "42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_namespace_isolation_on_clear() {
        let cache = local_cache();
        cache.register_namespace("a", NamespaceConfig::new(60, 100, false));
        cache.register_namespace("b", NamespaceConfig::new(60, 100, false));

        cache.set("a", "k", json!(1), None).await.unwrap();
        cache.set("b", "k", json!(2), None).await.unwrap();

        cache.clear_namespace("a").await.unwrap();
        assert_eq!(cache.get("a", "k").await.unwrap(), None);
        assert_eq!(cache.get("b", "k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_eviction_bound_and_policy() {
        let cache = local_cache();
        cache.register_namespace(
            "small",
            NamespaceConfig::new(60, 3, false).with_eviction(EvictionPolicy::Fifo),
        );

        for i in 0..10 {
            cache
                .set("small", &format!("k{i}"), json!(i), None)
                .await
                .unwrap();
        }

        let stats = cache.stats();
        let ns = &stats.namespaces["small"];
        assert_eq!(ns.entries, 3);
        assert_eq!(ns.counters.evictions, 7);
        // Oldest-inserted were evicted
        assert_eq!(cache.get("small", "k0").await.unwrap(), None);
        assert_eq!(cache.get("small", "k9").await.unwrap(), Some(json!(9)));
    }
}
