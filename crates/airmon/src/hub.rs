//! Broadcast hub: live subscriber registry and fan-out
//!
//! The hub owns the set of connected stream subscribers and pushes each
//! accepted reading to all of them. Delivery goes through a bounded
//! per-subscriber queue with a non-blocking send, so one slow or dead
//! consumer can never stall ingestion: a full or closed queue counts as
//! a delivery failure, the subscriber is closed and removed, and the
//! rest still receive the message.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::reading::Reading;

/// Queue depth per subscriber. A subscriber that falls this many
/// messages behind is treated as failed and disconnected.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 64;

/// Message pushed to stream subscribers, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Welcome payload sent once on successful registration
    Connection {
        message: String,
        clients: usize,
        timestamp: String,
    },
    /// One accepted reading. `timestamp` is the broadcast instant,
    /// distinct from the reading's own timestamp.
    SensorReading { data: Reading, timestamp: String },
    /// Liveness reply carrying the current server time
    Pong { timestamp: String },
}

impl WireMessage {
    /// Liveness acknowledgment for a subscriber `ping`.
    pub fn pong() -> Self {
        WireMessage::Pong {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Messages a subscriber may send upstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness probe; answered with [`WireMessage::Pong`]. No effect
    /// on the live set.
    Ping,
}

/// Subscriber connection lifecycle. Once `Closed`, the subscriber is
/// removed and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Connecting,
    Open,
    Closed,
}

/// Opaque subscriber identity, monotonically assigned on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live subscriber connection tracked by the hub.
struct Subscriber {
    /// Remote identity (e.g. peer address)
    addr: String,
    connected_at: Instant,
    tx: mpsc::Sender<WireMessage>,
    state: SubscriberState,
}

/// Detail about a connected subscriber (public API)
#[derive(Debug, Clone)]
pub struct SubscriberDetail {
    pub id: SubscriberId,
    pub addr: String,
    pub connected_at: Instant,
}

/// Delivery outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Statistics about hub state (snapshot from atomic counters)
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubStats {
    pub subscribers_connected: usize,
    pub messages_delivered: u64,
    pub delivery_failures: u64,
}

/// Internal atomic counters for lock-free stats tracking
struct AtomicHubStats {
    subscribers_connected: AtomicUsize,
    messages_delivered: AtomicU64,
    delivery_failures: AtomicU64,
}

impl AtomicHubStats {
    fn new() -> Self {
        Self {
            subscribers_connected: AtomicUsize::new(0),
            messages_delivered: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> HubStats {
        HubStats {
            subscribers_connected: self.subscribers_connected.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

struct HubInner {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    next_id: AtomicU64,
    stats: AtomicHubStats,
}

/// Broadcast hub distributing accepted readings to live subscribers.
///
/// Cheap to clone; all clones share the same live set.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                stats: AtomicHubStats::new(),
            }),
        }
    }

    /// Register a new subscriber and immediately queue its welcome
    /// message carrying the current live-subscriber count.
    ///
    /// A subscriber whose queue rejects even the welcome is dropped on
    /// the spot and never joins the live set.
    pub async fn register(
        &self,
        addr: impl Into<String>,
        tx: mpsc::Sender<WireMessage>,
    ) -> SubscriberId {
        let addr = addr.into();
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        let mut subscribers = self.inner.subscribers.write().await;
        subscribers.insert(
            id,
            Subscriber {
                addr: addr.clone(),
                connected_at: Instant::now(),
                tx: tx.clone(),
                state: SubscriberState::Connecting,
            },
        );
        let clients = subscribers.len();

        let welcome = WireMessage::Connection {
            message: "Connected to sensor data stream".to_string(),
            clients,
            timestamp: Utc::now().to_rfc3339(),
        };
        match tx.try_send(welcome) {
            Ok(()) => {
                if let Some(sub) = subscribers.get_mut(&id) {
                    sub.state = SubscriberState::Open;
                }
                self.inner
                    .stats
                    .subscribers_connected
                    .fetch_add(1, Ordering::Relaxed);
                info!(subscriber = %id, peer = %addr, clients, "Subscriber registered");
            }
            Err(e) => {
                subscribers.remove(&id);
                warn!(subscriber = %id, peer = %addr, error = %e, "Welcome delivery failed, dropping subscriber");
            }
        }

        id
    }

    /// Remove a subscriber from the live set. Idempotent: removing an
    /// already-absent subscriber is a no-op.
    pub async fn unregister(&self, id: SubscriberId) {
        let mut subscribers = self.inner.subscribers.write().await;
        if let Some(mut sub) = subscribers.remove(&id) {
            sub.state = SubscriberState::Closed;
            self.inner
                .stats
                .subscribers_connected
                .fetch_sub(1, Ordering::Relaxed);
            info!(subscriber = %id, peer = %sub.addr, "Subscriber unregistered");
        }
    }

    /// Deliver a reading to every open subscriber.
    ///
    /// Wraps the reading as a `sensor_reading` message with a fresh
    /// broadcast timestamp. A send failure for one subscriber is
    /// logged, closes that subscriber, and does not abort delivery to
    /// the rest. Never errors to the caller.
    pub async fn broadcast(&self, reading: &Reading) -> BroadcastReport {
        let message = WireMessage::SensorReading {
            data: reading.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };

        let mut report = BroadcastReport::default();
        let mut failed_ids = Vec::new();
        {
            let subscribers = self.inner.subscribers.read().await;
            for (id, sub) in subscribers.iter() {
                if sub.state != SubscriberState::Open {
                    continue;
                }
                match sub.tx.try_send(message.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        report.failed += 1;
                        failed_ids.push(*id);
                        warn!(subscriber = %id, peer = %sub.addr, error = %e, "Failed to deliver reading to subscriber");
                    }
                }
            }
        }

        if !failed_ids.is_empty() {
            let mut subscribers = self.inner.subscribers.write().await;
            for id in failed_ids {
                // remove() returning None means the subscriber already
                // left between the two locks; don't decrement twice
                if let Some(mut sub) = subscribers.remove(&id) {
                    sub.state = SubscriberState::Closed;
                    self.inner
                        .stats
                        .subscribers_connected
                        .fetch_sub(1, Ordering::Relaxed);
                    debug!(subscriber = %id, "Removed failed subscriber");
                }
            }
        }

        self.inner
            .stats
            .messages_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.inner
            .stats
            .delivery_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        debug!(
            delivered = report.delivered,
            failed = report.failed,
            "Reading broadcast"
        );

        report
    }

    /// Get list of connected subscribers
    pub async fn subscribers(&self) -> Vec<SubscriberDetail> {
        self.inner
            .subscribers
            .read()
            .await
            .iter()
            .map(|(id, sub)| SubscriberDetail {
                id: *id,
                addr: sub.addr.clone(),
                connected_at: sub.connected_at,
            })
            .collect()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().await.len()
    }

    /// Get current hub statistics
    pub async fn stats(&self) -> HubStats {
        self.inner.stats.snapshot()
    }
}
