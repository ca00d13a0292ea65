//! # Local In-Memory Mirror
//!
//! Per-namespace bounded map that backs the cache when the shared store is
//! disabled or unreachable, and warms reads when it is available. Expiry is
//! handled by a periodic sweep over entries rather than one timer per entry,
//! which bounds timer overhead at scale.

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::namespace::EvictionPolicy;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Value,
    expires_at: Instant,
    /// Monotonic recency tick; only meaningful under [`EvictionPolicy::Lru`]
    last_access: u64,
}

/// One namespace's worth of locally mirrored entries
#[derive(Debug)]
pub(crate) struct MemoryRegion {
    policy: EvictionPolicy,
    max_entries: usize,
    entries: HashMap<String, StoredEntry>,
    /// Insertion order for FIFO eviction; may hold stale keys after deletes,
    /// which eviction skips
    insertion: VecDeque<String>,
    tick: u64,
}

impl MemoryRegion {
    pub fn new(policy: EvictionPolicy, max_entries: usize) -> Self {
        Self {
            policy,
            max_entries: max_entries.max(1),
            entries: HashMap::new(),
            insertion: VecDeque::new(),
            tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert or overwrite an entry. Returns the number of entries evicted
    /// to stay within the namespace bound.
    pub fn insert(&mut self, key: &str, value: Value, ttl: Duration) -> u64 {
        let now = Instant::now();
        self.tick += 1;

        let is_new = !self.entries.contains_key(key);
        let mut evicted = 0;
        if is_new {
            while self.entries.len() >= self.max_entries {
                if self.evict_one() {
                    evicted += 1;
                } else {
                    break;
                }
            }
            self.insertion.push_back(key.to_string());
        }

        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                expires_at: now + ttl,
                last_access: self.tick,
            },
        );

        evicted
    }

    /// Read an entry, honoring expiry and touching the recency marker when
    /// the namespace is LRU-managed.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let touch = self.policy == EvictionPolicy::Lru;
        self.tick += 1;
        let tick = self.tick;

        let mut expired = false;
        let value = match self.entries.get_mut(key) {
            Some(entry) => {
                if entry.expires_at > now {
                    if touch {
                        entry.last_access = tick;
                    }
                    Some(entry.value.clone())
                } else {
                    // Expired but not yet swept
                    expired = true;
                    None
                }
            }
            None => None,
        };

        if expired {
            self.entries.remove(key);
        }
        value
    }

    /// Existence-style read: no recency touch, no removal of expired entries.
    pub fn peek(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn remove_prefix(&mut self, prefix: &str) -> u64 {
        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        let count = doomed.len() as u64;
        for key in doomed {
            self.entries.remove(&key);
        }
        count
    }

    pub fn clear(&mut self) -> u64 {
        let count = self.entries.len() as u64;
        self.entries.clear();
        self.insertion.clear();
        count
    }

    /// Remove expired entries. Returns the number removed.
    pub fn sweep(&mut self) -> u64 {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        let count = expired.len() as u64;
        for key in expired {
            self.entries.remove(&key);
        }
        count
    }

    fn evict_one(&mut self) -> bool {
        match self.policy {
            EvictionPolicy::Fifo => {
                while let Some(candidate) = self.insertion.pop_front() {
                    if self.entries.remove(&candidate).is_some() {
                        return true;
                    }
                }
                false
            }
            EvictionPolicy::Lru => {
                let victim = self
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_access)
                    .map(|(k, _)| k.clone());
                match victim {
                    Some(key) => self.entries.remove(&key).is_some(),
                    None => false,
                }
            }
        }
    }

}
