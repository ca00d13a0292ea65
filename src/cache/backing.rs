//! # Backing Store
//!
//! Seam over the shared substrate the shards coordinate through. Production
//! uses Redis; [`InMemoryBackingStore`] serves tests and single-process
//! deployments. Keys follow the `<namespace>:<key>` scheme and every write
//! carries an explicit TTL.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use super::errors::StoreError;

/// Narrow contract the cache requires from the shared substrate
#[async_trait]
pub trait BackingStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a value with an explicit TTL; the TTL is never optional
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Delete every key starting with `prefix`; returns the number removed
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError>;

    /// Atomically increment a counter, creating it with `ttl` on first use
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, StoreError>;

    /// Cheap liveness probe used by the recovery check
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Redis-backed implementation over a multiplexed connection manager
#[derive(Clone)]
pub struct RedisBackingStore {
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisBackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackingStore").finish()
    }
}

impl RedisBackingStore {
    /// Connect to Redis using a connection URL
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        debug!("Connected to Redis backing store");
        Ok(Self { manager })
    }
}

fn map_redis_err(err: redis::RedisError) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout(Duration::from_secs(0))
    } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        StoreError::Connection(err.to_string())
    } else {
        StoreError::Protocol(err.to_string())
    }
}

#[async_trait]
impl BackingStore for RedisBackingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await.map_err(map_redis_err)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, value, seconds)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.del(key).await.map_err(map_redis_err)?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut conn = self.manager.clone();
        let pattern = format!("{prefix}*");
        let mut removed = 0u64;
        let mut cursor = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_err)?;

            if !keys.is_empty() {
                let deleted: i64 = conn.del(&keys).await.map_err(map_redis_err)?;
                removed += deleted as u64;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(removed)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let mut conn = self.manager.clone();
        let count: i64 = conn.incr(key, 1).await.map_err(map_redis_err)?;
        if count == 1 {
            let _: bool = conn
                .expire(key, ttl.as_secs().max(1) as i64)
                .await
                .map_err(map_redis_err)?;
        }
        Ok(count)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }
}

/// In-process backing store used by tests and single-shard deployments.
///
/// `set_failing(true)` simulates an outage: every operation returns a
/// connection error until it is cleared, which exercises the cache's
/// local-mirror degradation path.
#[derive(Debug, Default)]
pub struct InMemoryBackingStore {
    entries: parking_lot::Mutex<HashMap<String, (String, Instant)>>,
    failing: AtomicBool,
}

impl InMemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Connection("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BackingStore for InMemoryBackingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        let mut entries = self.entries.lock();
        let (value, expired) = match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => {
                (Some(value.clone()), false)
            }
            Some(_) => (None, true),
            None => (None, false),
        };
        if expired {
            entries.remove(key);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut entries = self.entries.lock();
        let doomed: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        let count = doomed.len() as u64;
        for key in doomed {
            entries.remove(&key);
        }
        Ok(count)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        self.check_available()?;
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let next = match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => {
                value.parse::<i64>().unwrap_or(0) + 1
            }
            _ => 1,
        };
        let expires_at = if next == 1 {
            now + ttl
        } else {
            entries
                .get(key)
                .map(|(_, e)| *e)
                .unwrap_or(now + ttl)
        };
        entries.insert(key.to_string(), (next.to_string(), expires_at));
        Ok(next)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryBackingStore::new();
        store
            .set("guild_settings:42", "{\"prefix\":\"!\"}", Duration::from_secs(30))
            .await
            .unwrap();

        let value = store.get("guild_settings:42").await.unwrap();
        assert_eq!(value.as_deref(), Some("{\"prefix\":\"!\"}"));

        store.delete("guild_settings:42").await.unwrap();
        assert!(store.get("guild_settings:42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_prefix_delete() {
        let store = InMemoryBackingStore::new();
        store.set("cooldowns:a", "1", Duration::from_secs(30)).await.unwrap();
        store.set("cooldowns:b", "1", Duration::from_secs(30)).await.unwrap();
        store.set("stats:a", "1", Duration::from_secs(30)).await.unwrap();

        let removed = store.delete_prefix("cooldowns:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("stats:a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_in_memory_incr_and_outage() {
        let store = InMemoryBackingStore::new();
        assert_eq!(store.incr("c:k", Duration::from_secs(5)).await.unwrap(), 1);
        assert_eq!(store.incr("c:k", Duration::from_secs(5)).await.unwrap(), 2);

        store.set_failing(true);
        assert!(store.ping().await.is_err());
        assert!(store.get("c:k").await.is_err());

        store.set_failing(false);
        assert!(store.ping().await.is_ok());
    }
}
