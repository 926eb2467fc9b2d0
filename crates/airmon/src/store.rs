//! Bounded in-memory history of accepted readings
//!
//! Strict FIFO: insertion order is arrival order and overflow evicts
//! exactly the oldest reading. A `VecDeque` keeps append and evict
//! amortized O(1). Queries copy out; callers never hold a live view
//! into the sequence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::RelayError;
use crate::reading::Reading;

/// Default number of readings retained.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Snapshot of store counters.
///
/// Serialized camelCase to match the dashboard's stats contract.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub current_count: usize,
    pub capacity: usize,
    /// Total readings ever accepted, regardless of eviction
    pub total_received: u64,
    pub initialized_at: DateTime<Utc>,
}

/// Capacity-bounded history store.
///
/// Mutations and reads are mutually exclusive; reads run concurrently
/// with each other. Capacity is fixed at construction.
pub struct HistoryStore {
    readings: RwLock<VecDeque<Reading>>,
    capacity: usize,
    total_received: AtomicU64,
    initialized_at: DateTime<Utc>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "History capacity must be non-zero");
        Self {
            readings: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            total_received: AtomicU64::new(0),
            initialized_at: Utc::now(),
        }
    }

    /// Append a reading to the tail, evicting the head when capacity
    /// would be exceeded. Infallible; returns the new current count.
    pub async fn append(&self, reading: Reading) -> usize {
        self.total_received.fetch_add(1, Ordering::Relaxed);
        let mut readings = self.readings.write().await;
        readings.push_back(reading);
        if readings.len() > self.capacity {
            readings.pop_front();
        }
        readings.len()
    }

    /// The most recent reading, or [`RelayError::Empty`].
    pub async fn latest(&self) -> Result<Reading, RelayError> {
        self.readings
            .read()
            .await
            .back()
            .cloned()
            .ok_or(RelayError::Empty)
    }

    /// Independent copy of the full history, oldest first.
    pub async fn all(&self) -> Vec<Reading> {
        self.readings.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.readings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.readings.read().await.is_empty()
    }

    /// Empty the history. `total_received` and `initialized_at` are
    /// untouched. Returns the number of readings dropped.
    pub async fn clear(&self) -> usize {
        let mut readings = self.readings.write().await;
        let dropped = readings.len();
        readings.clear();
        dropped
    }

    pub async fn stats(&self) -> StoreStats {
        StoreStats {
            current_count: self.readings.read().await.len(),
            capacity: self.capacity,
            total_received: self.total_received.load(Ordering::Relaxed),
            initialized_at: self.initialized_at,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
