//! Integration tests for the cache + degradation manager wiring: substrate
//! outages degrade reads to the local mirror, surface as health transitions,
//! and recovery replays deferred writes in order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use herald_core::cache::{InMemoryBackingStore, NamespaceConfig, SharedCache};
use herald_core::config::{CacheSettings, DegradationSettings};
use herald_core::degradation::{
    DegradationLevel, DegradationManager, HealthState, QueuedWrite, WriteExecutor,
};

fn test_settings() -> DegradationSettings {
    DegradationSettings {
        max_replay_retries: 2,
        replay_backoff_base_ms: 5,
        ..DegradationSettings::default()
    }
}

async fn wired_stack() -> (
    Arc<InMemoryBackingStore>,
    Arc<SharedCache>,
    Arc<DegradationManager>,
) {
    let backing = Arc::new(InMemoryBackingStore::new());
    let cache = SharedCache::new(backing.clone(), CacheSettings::default());
    let degradation = DegradationManager::new(cache.clone(), test_settings());
    cache.set_health_sink(degradation.clone());
    degradation.initialize().await;
    (backing, cache, degradation)
}

/// Records every write it replays so tests can assert ordering
struct RecordingExecutor {
    replayed: parking_lot::Mutex<Vec<String>>,
    fail_first: std::sync::atomic::AtomicU32,
}

impl RecordingExecutor {
    fn new(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            replayed: parking_lot::Mutex::new(Vec::new()),
            fail_first: std::sync::atomic::AtomicU32::new(fail_first),
        })
    }

    fn seen(&self) -> Vec<String> {
        self.replayed.lock().clone()
    }
}

#[async_trait]
impl WriteExecutor for RecordingExecutor {
    async fn execute(
        &self,
        write: &QueuedWrite,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let remaining = self
            .fail_first
            .fetch_update(
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
                |n| if n > 0 { Some(n - 1) } else { None },
            )
            .is_ok();
        if remaining {
            return Err("target hiccup".into());
        }
        self.replayed.lock().push(write.description.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_store_outage_reports_unavailable_and_mirror_serves_reads() {
    let (backing, cache, degradation) = wired_stack().await;
    cache.register_namespace("api_responses", NamespaceConfig::new(300, 100, true));

    cache
        .set("api_responses", "stream:1", json!({"viewers": 512}), None)
        .await
        .unwrap();

    backing.set_failing(true);

    // The read degrades to the mirror and the failure reaches the manager
    let value = cache.get("api_responses", "stream:1").await.unwrap();
    assert_eq!(value, Some(json!({"viewers": 512})));
    assert_eq!(degradation.health("redis"), Some(HealthState::Unavailable));
    assert_eq!(degradation.level(), DegradationLevel::Critical);

    degradation.shutdown().await;
}

#[tokio::test]
async fn test_replay_runs_in_enqueue_order_on_recovery() {
    let (_backing, _cache, degradation) = wired_stack().await;

    let executor = RecordingExecutor::new(0);
    degradation.register_write_executor("stats_db", executor.clone());
    degradation.mark_unavailable("stats_db");

    for label in ["first", "second", "third"] {
        degradation
            .enqueue_write("stats_db", label, json!({"op": label}))
            .await
            .unwrap();
    }
    assert_eq!(degradation.queued_writes("stats_db"), 3);

    // Recovery triggers the wired replay consumer
    degradation.mark_healthy("stats_db");

    tokio::time::timeout(Duration::from_secs(2), async {
        while degradation.queued_writes("stats_db") > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("replay did not drain the queue");

    assert_eq!(executor.seen(), vec!["first", "second", "third"]);
    assert!(degradation.dead_letters().is_empty());

    degradation.shutdown().await;
}

#[tokio::test]
async fn test_replay_retries_then_dead_letters() {
    let (_backing, _cache, degradation) = wired_stack().await;

    // Fails more times than max_replay_retries (2) allows
    let executor = RecordingExecutor::new(10);
    degradation.register_write_executor("stats_db", executor.clone());
    degradation.mark_unavailable("stats_db");

    degradation
        .enqueue_write("stats_db", "doomed", json!({"op": "doomed"}))
        .await
        .unwrap();

    degradation.mark_healthy("stats_db");

    tokio::time::timeout(Duration::from_secs(2), async {
        while degradation.dead_letters().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("write never reached the dead letter record");

    let dead = degradation.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].write.description, "doomed");
    assert_eq!(dead[0].write.retry_count, 3);
    assert_eq!(degradation.queued_writes("stats_db"), 0);

    degradation.shutdown().await;
}

#[tokio::test]
async fn test_queue_bound_drops_oldest_and_counts() {
    let backing = Arc::new(InMemoryBackingStore::new());
    let cache = SharedCache::new(backing, CacheSettings::default());
    let settings = DegradationSettings {
        max_queue_entries_per_target: 2,
        ..test_settings()
    };
    let degradation = DegradationManager::new(cache.clone(), settings);
    cache.set_health_sink(degradation.clone());
    degradation.initialize().await;

    degradation.mark_unavailable("stats_db");
    for label in ["a", "b", "c"] {
        degradation
            .enqueue_write("stats_db", label, Value::from(label))
            .await
            .unwrap();
    }

    assert_eq!(degradation.queued_writes("stats_db"), 2);
    assert_eq!(degradation.dropped_writes(), 1);

    degradation.shutdown().await;
}

#[tokio::test]
async fn test_fallback_round_trip_through_cache_seam() {
    let (backing, cache, degradation) = wired_stack().await;

    degradation
        .store_fallback("global:emotes", json!(["Kappa", "PogChamp"]))
        .await
        .unwrap();

    // Fallback survives a substrate outage via the cache's local mirror
    backing.set_failing(true);
    let value = degradation.get_fallback("global:emotes").await.unwrap();
    assert_eq!(value, json!(["Kappa", "PogChamp"]));

    let _ = cache;
    degradation.shutdown().await;
}
