//! Ingestion pipeline: validation, history, audit, fan-out
//!
//! The relay is the one place the pieces compose. It is constructed
//! once at process start and shared by `Arc` handle; there is no
//! ambient global state.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::audit::AuditSink;
use crate::error::RelayError;
use crate::hub::Hub;
use crate::reading::ReadingPayload;
use crate::store::HistoryStore;

/// The relay core: owns the history store, the broadcast hub, and the
/// injected audit sink.
pub struct Relay {
    store: HistoryStore,
    hub: Hub,
    audit: Arc<dyn AuditSink>,
}

impl Relay {
    pub fn new(capacity: usize, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store: HistoryStore::new(capacity),
            hub: Hub::new(),
            audit,
        }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Ingest one candidate reading.
    ///
    /// A validation failure rejects the whole request: nothing is
    /// appended, audited, or broadcast. On success the reading is
    /// appended to the history before the broadcast begins, so any
    /// concurrent `latest()` already reflects it by the time a
    /// subscriber observes the push. Audit failures are logged and
    /// swallowed. Returns the current history count after the append.
    pub async fn ingest(&self, payload: ReadingPayload) -> Result<usize, RelayError> {
        let reading = payload.validate()?;

        let count = self.store.append(reading.clone()).await;

        if let Err(e) = self.audit.record(&reading).await {
            warn!(error = %e, "Audit log write failed");
        }

        let report = self.hub.broadcast(&reading).await;
        debug!(
            count,
            delivered = report.delivered,
            failed = report.failed,
            sensor = %reading.sensor_sn,
            ppb = reading.ppb,
            "Reading ingested"
        );

        Ok(count)
    }
}
