//! # Deferred Write Queue
//!
//! Bounded per-target buffer for writes that could not reach their durable
//! target. Entries are append-only until dequeued for replay; when a queue
//! is full the oldest entry is evicted first and the drop is recorded as a
//! metric, never silently. Replay runs as one logical consumer per target -
//! the `replaying` guard refuses a second concurrent replayer, which would
//! reorder writes.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// One write deferred because its target was unreachable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedWrite {
    pub id: Uuid,
    /// Target service the write belongs to
    pub target: String,
    /// Human-readable description of the operation
    pub description: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl QueuedWrite {
    pub fn new(target: impl Into<String>, description: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            description: description.into(),
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
        }
    }
}

/// A write that exhausted its retry budget during replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub write: QueuedWrite,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TargetQueue {
    entries: parking_lot::Mutex<VecDeque<QueuedWrite>>,
    replaying: AtomicBool,
}

/// All per-target queues plus drop/dead-letter bookkeeping
#[derive(Debug)]
pub(crate) struct WriteQueue {
    targets: DashMap<String, Arc<TargetQueue>>,
    max_entries_per_target: usize,
    dropped: AtomicU64,
    dead_letters: parking_lot::Mutex<Vec<DeadLetter>>,
}

impl WriteQueue {
    pub fn new(max_entries_per_target: usize) -> Self {
        Self {
            targets: DashMap::new(),
            max_entries_per_target: max_entries_per_target.max(1),
            dropped: AtomicU64::new(0),
            dead_letters: parking_lot::Mutex::new(Vec::new()),
        }
    }

    fn target(&self, target: &str) -> Arc<TargetQueue> {
        self.targets
            .entry(target.to_string())
            .or_default()
            .clone()
    }

    /// Append a write, evicting the oldest entry when the target is at
    /// capacity. Returns the evicted write, if any, so the caller can clean
    /// up its durable mirror.
    pub fn enqueue(&self, write: QueuedWrite) -> Option<QueuedWrite> {
        let queue = self.target(&write.target);
        let mut entries = queue.entries.lock();

        let evicted = if entries.len() >= self.max_entries_per_target {
            let oldest = entries.pop_front();
            if let Some(ref dropped) = oldest {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target_service = %dropped.target,
                    write_id = %dropped.id,
                    "Write queue full, dropping oldest entry"
                );
            }
            oldest
        } else {
            None
        };

        entries.push_back(write);
        evicted
    }

    /// Dequeue the oldest write for a target
    pub fn pop_front(&self, target: &str) -> Option<QueuedWrite> {
        let queue = self.target(target);
        let mut entries = queue.entries.lock();
        entries.pop_front()
    }

    /// Put a write back at the head of its queue, preserving replay order
    pub fn push_front(&self, write: QueuedWrite) {
        let queue = self.target(&write.target);
        queue.entries.lock().push_front(write);
    }

    /// Acquire the single-replayer guard for a target. Returns false when a
    /// replay is already running.
    pub fn try_begin_replay(&self, target: &str) -> bool {
        let queue = self.target(target);
        queue
            .replaying
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_replay(&self, target: &str) {
        let queue = self.target(target);
        queue.replaying.store(false, Ordering::Release);
    }

    pub fn len(&self, target: &str) -> usize {
        self.targets
            .get(target)
            .map(|queue| queue.entries.lock().len())
            .unwrap_or(0)
    }

    pub fn total_len(&self) -> usize {
        self.targets
            .iter()
            .map(|entry| entry.value().entries.lock().len())
            .sum()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn push_dead_letter(&self, write: QueuedWrite, reason: impl Into<String>) {
        self.dead_letters.lock().push(DeadLetter {
            write,
            reason: reason.into(),
            dead_lettered_at: Utc::now(),
        });
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().clone()
    }
}
