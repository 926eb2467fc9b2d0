//! Airmon Server — headless telemetry relay
//!
//! Accepts sensor readings pushed over HTTP, retains a bounded recent
//! history, and fans readings out to WebSocket dashboard clients.
//!
//! ## Usage
//!
//! ```bash
//! # Start server (API on port 3001)
//! airmon-server
//!
//! # Custom port
//! AIRMON_PORT=8080 airmon-server
//!
//! # With the CSV audit log enabled
//! AIRMON_AUDIT_LOG=/var/log/airmon/readings.csv airmon-server
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use airmon::audit::{AuditSink, CsvAudit, NullAudit, DEFAULT_MAX_ENTRIES};
use airmon::{Relay, DEFAULT_CAPACITY};

/// Server configuration from environment
struct Config {
    port: u16,
    history_capacity: usize,
    audit_log: Option<PathBuf>,
    audit_max_entries: u64,
    ui_path: Option<PathBuf>,
}

impl Config {
    fn from_env() -> Self {
        let port: u16 = std::env::var("AIRMON_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3001);

        let history_capacity: usize = std::env::var("AIRMON_HISTORY_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CAPACITY);

        let audit_log = std::env::var("AIRMON_AUDIT_LOG").map(PathBuf::from).ok();

        let audit_max_entries: u64 = std::env::var("AIRMON_AUDIT_MAX_ENTRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_ENTRIES);

        let ui_path = std::env::var("AIRMON_UI_PATH").map(PathBuf::from).ok();

        Self {
            port,
            history_capacity,
            audit_log,
            audit_max_entries,
            ui_path,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::from_env();

    info!("Airmon Server starting");
    info!("  Port: {}", config.port);
    info!("  History capacity: {}", config.history_capacity);
    if let Some(ref ui_path) = config.ui_path {
        info!("  UI path: {:?}", ui_path);
    }

    let audit: Arc<dyn AuditSink> = if let Some(ref path) = config.audit_log {
        info!("  Audit log: {:?} (max {} entries)", path, config.audit_max_entries);
        if let Some(parent) = path.parent() {
            if !parent.exists() && !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Arc::new(CsvAudit::new(path.clone(), config.audit_max_entries))
    } else {
        info!("  Audit log: disabled (set AIRMON_AUDIT_LOG to enable)");
        Arc::new(NullAudit)
    };

    let relay = Arc::new(Relay::new(config.history_capacity, audit));

    // Graceful shutdown
    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    // Spawn web server
    let web_relay = relay.clone();
    let web_bind = SocketAddr::from(([0, 0, 0, 0], config.port));
    let web_ui_path = config.ui_path.clone();
    let web_cancel = cancel.clone();
    tracker.spawn(async move {
        tokio::select! {
            result = airmon::web::start(web_relay, web_bind, web_ui_path) => {
                if let Err(e) = result {
                    error!("Web server error: {}", e);
                }
            }
            _ = web_cancel.cancelled() => {
                info!("Web server: shutting down");
            }
        }
    });

    tracker.close();

    run_headless(relay, cancel, tracker).await
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("airmon=info".parse().unwrap()),
        )
        .init();
}

/// Headless mode: log stats periodically, shut down on SIGINT/SIGTERM
async fn run_headless(
    relay: Arc<Relay>,
    cancel: CancellationToken,
    tracker: TaskTracker,
) -> Result<()> {
    info!("Waiting for readings...");
    let mut stats_interval = interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                cancel.cancel();
                break;
            }
            _ = stats_interval.tick() => {
                let store = relay.store().stats().await;
                let hub = relay.hub().stats().await;
                info!(
                    "Stats: {}/{} readings held ({} total), {} subscribers, {} delivered, {} failed",
                    store.current_count, store.capacity, store.total_received,
                    hub.subscribers_connected, hub.messages_delivered, hub.delivery_failures
                );
            }
        }
    }

    if tokio::time::timeout(Duration::from_secs(5), tracker.wait()).await.is_err() {
        tracing::warn!("Shutdown timed out after 5s");
    }
    Ok(())
}
