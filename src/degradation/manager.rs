//! # Degradation Manager
//!
//! Tracks per-service health, aggregates it into a system-wide level, and
//! offers two survival mechanisms built on the shared cache: a
//! last-known-good fallback cache and a bounded write-intent queue replayed
//! when a target recovers.
//!
//! The replay consumer is wired here, not left to callers: `initialize`
//! subscribes to health transitions and every transition back to Healthy
//! triggers an ordered replay of that target's queue. A queue with no
//! consumer gives false confidence, so this wiring is part of the
//! component's contract.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{CacheError, CacheResult};
use crate::config::DegradationSettings;
use crate::events::{EventPublisher, HealthTransition};

use super::errors::{DegradationError, DegradationResult};
use super::health::{DegradationLevel, HealthState, ServiceHealth};
use super::write_queue::{DeadLetter, QueuedWrite, WriteQueue};

/// Narrow store seam the manager persists through. Implemented by
/// [`crate::cache::SharedCache`]; extracted as an interface so the manager
/// never depends on the full cache API.
#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Ensure a storage region exists with the given TTL and entry bound
    fn register_region(&self, region: &str, ttl_seconds: u64, max_entries: usize);

    async fn put(&self, region: &str, key: &str, value: Value) -> CacheResult<()>;

    async fn fetch(&self, region: &str, key: &str) -> CacheResult<Option<Value>>;

    async fn remove(&self, region: &str, key: &str) -> CacheResult<()>;
}

/// Computes a stand-in value for a key when nothing cached is available
#[async_trait]
pub trait FallbackSupplier: Send + Sync {
    async fn supply(&self) -> Result<Value, Box<dyn std::error::Error + Send + Sync>>;
}

/// Replays one deferred write against its recovered target
#[async_trait]
pub trait WriteExecutor: Send + Sync {
    async fn execute(
        &self,
        write: &QueuedWrite,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Point-in-time view for operators and health endpoints
#[derive(Debug, Clone, serde::Serialize)]
pub struct DegradationSnapshot {
    pub level: DegradationLevel,
    pub services: Vec<ServiceHealth>,
    pub queued_writes: usize,
    pub dropped_writes: u64,
    pub dead_letters: usize,
}

/// Per-service health tracking plus fallback cache and write queue
pub struct DegradationManager {
    services: DashMap<String, ServiceHealth>,
    store: Arc<dyn StateStore>,
    suppliers: DashMap<String, Arc<dyn FallbackSupplier>>,
    executors: DashMap<String, Arc<dyn WriteExecutor>>,
    queue: Arc<WriteQueue>,
    events: EventPublisher,
    settings: DegradationSettings,
    shutdown_tx: watch::Sender<bool>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DegradationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradationManager")
            .field("services", &self.services.len())
            .field("queued_writes", &self.queue.total_len())
            .finish()
    }
}

impl DegradationManager {
    pub fn new(store: Arc<dyn StateStore>, settings: DegradationSettings) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            services: DashMap::new(),
            store,
            suppliers: DashMap::new(),
            executors: DashMap::new(),
            queue: Arc::new(WriteQueue::new(settings.max_queue_entries_per_target)),
            events: EventPublisher::new(settings.event_capacity),
            settings,
            shutdown_tx,
            consumer: Mutex::new(None),
        })
    }

    /// Register storage regions and start the replay consumer. Must be
    /// called once by the hosting process before the manager is shared.
    pub async fn initialize(self: &Arc<Self>) {
        self.store.register_region(
            &self.settings.fallback_region,
            self.settings.fallback_ttl_seconds,
            self.settings.fallback_max_entries,
        );
        self.store.register_region(
            &self.settings.queue_region,
            self.settings.fallback_ttl_seconds,
            self.settings.max_queue_entries_per_target * 8,
        );

        let manager = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut transitions = self.events.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    received = transitions.recv() => {
                        match received {
                            Ok(transition) if transition.to == HealthState::Healthy => {
                                let replayer = Arc::clone(&manager);
                                let target = transition.service.clone();
                                tokio::spawn(async move {
                                    replayer.replay_target(&target).await;
                                });
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(skipped, "Replay consumer lagged behind health events");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });

        *self.consumer.lock().await = Some(handle);
        info!("Degradation manager initialized, replay consumer running");
    }

    /// Stop the replay consumer and drain remaining queues for healthy
    /// targets.
    pub async fn shutdown(self: &Arc<Self>) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.consumer.lock().await.take() {
            let _ = handle.await;
        }

        let targets: Vec<String> = self
            .services
            .iter()
            .filter(|entry| entry.value().state == HealthState::Healthy)
            .map(|entry| entry.key().clone())
            .collect();
        for target in targets {
            self.replay_target(&target).await;
        }

        let remaining = self.queue.total_len();
        if remaining > 0 {
            warn!(remaining, "Shutting down with undrained queued writes");
        }
    }

    // ---- Health tracking -------------------------------------------------

    pub fn mark_healthy(&self, service: &str) {
        self.transition(service, HealthState::Healthy);
    }

    pub fn mark_degraded(&self, service: &str) {
        self.transition(service, HealthState::Degraded);
    }

    pub fn mark_unavailable(&self, service: &str) {
        self.transition(service, HealthState::Unavailable);
    }

    fn transition(&self, service: &str, to: HealthState) {
        let mut entry = self
            .services
            .entry(service.to_string())
            .or_insert_with(|| ServiceHealth::new(service));

        let from = entry.state;
        match to {
            HealthState::Healthy => entry.consecutive_failures = 0,
            _ => entry.consecutive_failures += 1,
        }

        if from == to {
            return;
        }

        entry.state = to;
        entry.last_transition = chrono::Utc::now();
        drop(entry);

        info!(service = %service, %from, %to, "Service health transition");
        self.events.publish(service, from, to);
    }

    /// Current health of one tracked service
    pub fn health(&self, service: &str) -> Option<HealthState> {
        self.services.get(service).map(|entry| entry.state)
    }

    /// System-wide degradation level: worst of all tracked services
    pub fn level(&self) -> DegradationLevel {
        DegradationLevel::from_states(self.services.iter().map(|entry| entry.value().state))
    }

    /// Subscribe to health transitions
    pub fn subscribe(&self) -> broadcast::Receiver<HealthTransition> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> DegradationSnapshot {
        DegradationSnapshot {
            level: self.level(),
            services: self
                .services
                .iter()
                .map(|entry| entry.value().clone())
                .collect(),
            queued_writes: self.queue.total_len(),
            dropped_writes: self.queue.dropped_count(),
            dead_letters: self.queue.dead_letters().len(),
        }
    }

    // ---- Fallback cache --------------------------------------------------

    /// Register how to compute a stand-in value for a key
    pub fn register_fallback(&self, key: &str, supplier: Arc<dyn FallbackSupplier>) {
        self.suppliers.insert(key.to_string(), supplier);
    }

    /// Store a last-known-good value, called opportunistically after
    /// successful primary reads
    pub async fn store_fallback(&self, key: &str, value: Value) -> DegradationResult<()> {
        let entry = serde_json::json!({
            "value": value,
            "stored_at": chrono::Utc::now().to_rfc3339(),
        });
        self.store
            .put(&self.settings.fallback_region, key, entry)
            .await
            .map_err(|e| DegradationError::store(e.to_string()))
    }

    /// Fetch the most recent fallback value for a key regardless of
    /// freshness; consults the registered supplier only when nothing has
    /// been stored yet.
    pub async fn get_fallback(&self, key: &str) -> DegradationResult<Value> {
        match self.store.fetch(&self.settings.fallback_region, key).await {
            Ok(Some(entry)) => {
                if let Some(value) = entry.get("value") {
                    return Ok(value.clone());
                }
                Ok(entry)
            }
            Ok(None) => self.supply_fallback(key).await,
            Err(CacheError::UnregisteredNamespace { .. }) => Err(DegradationError::store(
                "fallback region not registered; call initialize() first",
            )),
            Err(err) => {
                debug!(key = %key, error = %err, "Fallback store read failed, trying supplier");
                self.supply_fallback(key).await
            }
        }
    }

    async fn supply_fallback(&self, key: &str) -> DegradationResult<Value> {
        let supplier = self
            .suppliers
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DegradationError::NoFallback {
                key: key.to_string(),
            })?;

        let value = supplier
            .supply()
            .await
            .map_err(|e| DegradationError::NoFallback {
                key: format!("{key} (supplier failed: {e})"),
            })?;

        // Cache the supplied value for the next consumer
        let _ = self.store_fallback(key, value.clone()).await;
        Ok(value)
    }

    // ---- Write queue -----------------------------------------------------

    /// Register the executor that replays deferred writes for a target
    pub fn register_write_executor(&self, target: &str, executor: Arc<dyn WriteExecutor>) {
        self.executors.insert(target.to_string(), executor);
    }

    /// Defer a write because its durable target is unreachable. The entry
    /// is mirrored through the store seam for durability; the mirror write
    /// itself degrades gracefully when the substrate is down.
    pub async fn enqueue_write(
        &self,
        target: &str,
        description: &str,
        payload: Value,
    ) -> DegradationResult<Uuid> {
        let write = QueuedWrite::new(target, description, payload);
        let id = write.id;
        let mirror_key = Self::mirror_key(&write);

        match serde_json::to_value(&write) {
            Ok(serialized) => {
                if let Err(err) = self
                    .store
                    .put(&self.settings.queue_region, &mirror_key, serialized)
                    .await
                {
                    debug!(write_id = %id, error = %err, "Write mirror not persisted");
                }
            }
            Err(err) => {
                debug!(write_id = %id, error = %err, "Write payload not serializable for mirror");
            }
        }

        if let Some(evicted) = self.queue.enqueue(write) {
            let _ = self
                .store
                .remove(&self.settings.queue_region, &Self::mirror_key(&evicted))
                .await;
        }

        Ok(id)
    }

    /// Number of writes currently queued for a target
    pub fn queued_writes(&self, target: &str) -> usize {
        self.queue.len(target)
    }

    /// Writes dropped due to queue bounds since startup
    pub fn dropped_writes(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// Writes that exhausted their retry budget
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.queue.dead_letters()
    }

    /// Replay a target's queue in enqueue order. One logical consumer per
    /// target: a second concurrent call returns immediately.
    pub async fn replay_target(&self, target: &str) {
        if !self.queue.try_begin_replay(target) {
            debug!(target_service = %target, "Replay already running for target");
            return;
        }

        let executor = match self.executors.get(target).map(|e| e.value().clone()) {
            Some(executor) => executor,
            None => {
                if self.queue.len(target) > 0 {
                    error!(
                        target_service = %target,
                        queued = self.queue.len(target),
                        "Queued writes exist but no executor is registered"
                    );
                }
                self.queue.end_replay(target);
                return;
            }
        };

        let mut replayed = 0u32;
        loop {
            // Stop when the target drops out of Healthy mid-replay
            if self.health(target) != Some(HealthState::Healthy) {
                debug!(target_service = %target, "Target unhealthy, pausing replay");
                break;
            }

            let Some(mut write) = self.queue.pop_front(target) else {
                break;
            };
            let mirror_key = Self::mirror_key(&write);

            match executor.execute(&write).await {
                Ok(()) => {
                    replayed += 1;
                    let _ = self
                        .store
                        .remove(&self.settings.queue_region, &mirror_key)
                        .await;
                }
                Err(err) => {
                    write.retry_count += 1;
                    if write.retry_count > self.settings.max_replay_retries {
                        error!(
                            target_service = %target,
                            write_id = %write.id,
                            attempts = write.retry_count,
                            error = %err,
                            "Write exhausted retries, moving to dead letter"
                        );
                        let _ = self
                            .store
                            .remove(&self.settings.queue_region, &mirror_key)
                            .await;
                        self.queue.push_dead_letter(write, err.to_string());
                    } else {
                        let backoff = self.settings.replay_backoff_base()
                            * 2u32.saturating_pow(write.retry_count.saturating_sub(1));
                        warn!(
                            target_service = %target,
                            write_id = %write.id,
                            retry = write.retry_count,
                            backoff_ms = backoff.as_millis(),
                            "Replay attempt failed, requeueing"
                        );
                        self.queue.push_front(write);
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        if replayed > 0 {
            info!(target_service = %target, replayed, "Replay pass complete");
        }
        self.queue.end_replay(target);
    }

    fn mirror_key(write: &QueuedWrite) -> String {
        format!("{}:{}", write.target, write.id)
    }
}

/// Lets the cache report substrate failures without holding the full
/// manager API
impl crate::cache::HealthSink for DegradationManager {
    fn report_healthy(&self, service: &str) {
        self.mark_healthy(service);
    }

    fn report_unavailable(&self, service: &str) {
        self.mark_unavailable(service);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct MapStore {
        entries: DashMap<String, Value>,
    }

    #[async_trait]
    impl StateStore for MapStore {
        fn register_region(&self, _region: &str, _ttl_seconds: u64, _max_entries: usize) {}

        async fn put(&self, region: &str, key: &str, value: Value) -> CacheResult<()> {
            self.entries.insert(format!("{region}:{key}"), value);
            Ok(())
        }

        async fn fetch(&self, region: &str, key: &str) -> CacheResult<Option<Value>> {
            Ok(self
                .entries
                .get(&format!("{region}:{key}"))
                .map(|e| e.value().clone()))
        }

        async fn remove(&self, region: &str, key: &str) -> CacheResult<()> {
            self.entries.remove(&format!("{region}:{key}"));
            Ok(())
        }
    }

    fn test_manager() -> Arc<DegradationManager> {
        DegradationManager::new(Arc::new(MapStore::default()), DegradationSettings::default())
    }

    #[tokio::test]
    async fn test_level_aggregation() {
        let manager = test_manager();
        manager.mark_healthy("db");
        manager.mark_degraded("twitch_api");
        assert_eq!(manager.level(), DegradationLevel::Degraded);

        manager.mark_unavailable("twitch_api");
        assert_eq!(manager.level(), DegradationLevel::Critical);

        manager.mark_healthy("twitch_api");
        assert_eq!(manager.level(), DegradationLevel::Normal);
    }

    #[tokio::test]
    async fn test_fallback_store_and_get() {
        let manager = test_manager();
        manager
            .store_fallback("channel:badges", serde_json::json!(["mod", "vip"]))
            .await
            .unwrap();

        let value = manager.get_fallback("channel:badges").await.unwrap();
        assert_eq!(value, serde_json::json!(["mod", "vip"]));
    }

    #[tokio::test]
    async fn test_fallback_supplier_used_when_nothing_stored() {
        struct FixedSupplier;

        #[async_trait]
        impl FallbackSupplier for FixedSupplier {
            async fn supply(
                &self,
            ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
                Ok(serde_json::json!({"emotes": []}))
            }
        }

        let manager = test_manager();
        manager.register_fallback("channel:emotes", Arc::new(FixedSupplier));

        let value = manager.get_fallback("channel:emotes").await.unwrap();
        assert_eq!(value, serde_json::json!({"emotes": []}));

        // Supplier output is cached; the stored value wins on the next read
        let again = manager.get_fallback("channel:emotes").await.unwrap();
        assert_eq!(again, serde_json::json!({"emotes": []}));
    }

    #[tokio::test]
    async fn test_snapshot_reflects_state() {
        let manager = test_manager();
        manager.mark_degraded("twitch_api");
        manager
            .enqueue_write("stats_db", "count", serde_json::json!(1))
            .await
            .unwrap();

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.level, DegradationLevel::Degraded);
        assert_eq!(snapshot.services.len(), 1);
        assert_eq!(snapshot.queued_writes, 1);
        assert_eq!(snapshot.dead_letters, 0);
    }

    #[tokio::test]
    async fn test_unknown_fallback_errors() {
        let manager = test_manager();
        let result = manager.get_fallback("never:registered").await;
        assert!(matches!(result, Err(DegradationError::NoFallback { .. })));
    }
}
