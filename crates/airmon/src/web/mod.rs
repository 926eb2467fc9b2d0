//! Web layer: axum HTTP + WebSocket surfaces for the relay
//!
//! - `POST   /api/sensor/data` — ingest one reading
//! - `GET    /api/sensor/latest` — most recent reading
//! - `GET    /api/sensor/history` — full retained history
//! - `GET    /api/sensor/stats` — store counters
//! - `DELETE /api/sensor/history` — clear the retained history
//! - `GET    /api/status` — server status
//! - `WS     /ws` — live reading stream

pub mod ws;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::error::RelayError;
use crate::reading::ReadingPayload;
use crate::relay::Relay;

/// Shared state for the web server
struct WebState {
    relay: Arc<Relay>,
    start_time: Instant,
}

/// Build the relay's router. Exposed so tests can serve it on an
/// ephemeral listener.
pub fn router(relay: Arc<Relay>) -> Router {
    let state = Arc::new(WebState {
        relay,
        start_time: Instant::now(),
    });

    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/api/sensor/data", axum::routing::post(ingest))
        .route("/api/sensor/latest", get(latest))
        .route(
            "/api/sensor/history",
            get(history).delete(clear_history),
        )
        .route("/api/sensor/stats", get(sensor_stats))
        .route("/api/status", get(api_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the web server.
///
/// `ui_path` — directory with the dashboard build output. If None,
/// only API/WS endpoints are served.
pub async fn start(relay: Arc<Relay>, bind: SocketAddr, ui_path: Option<PathBuf>) -> Result<()> {
    let mut app = router(relay);

    if let Some(ref path) = ui_path {
        if path.exists() {
            info!("Serving UI from {:?}", path);
            app = app.fallback_service(
                ServeDir::new(path).append_index_html_on_directories(true),
            );
        } else {
            tracing::warn!("UI path {:?} does not exist, skipping static file serving", path);
        }
    }

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("Failed to bind to {}", bind))?;

    info!("Web server listening on http://{}", bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Web server error")?;

    Ok(())
}

/// WebSocket upgrade handler
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<WebState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_ws(socket, state.relay.clone(), addr))
}

/// POST /api/sensor/data — ingestion boundary
async fn ingest(
    State(state): State<Arc<WebState>>,
    Json(payload): Json<ReadingPayload>,
) -> impl IntoResponse {
    match state.relay.ingest(payload).await {
        Ok(count) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "count": count })),
        ),
        Err(RelayError::InvalidReading { missing }) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Missing required fields",
                "missing": missing,
            })),
        ),
        Err(e) => {
            error!(error = %e, "Unexpected ingestion failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Internal server error" })),
            )
        }
    }
}

/// GET /api/sensor/latest — empty store is a distinct 404, not a failure
async fn latest(State(state): State<Arc<WebState>>) -> impl IntoResponse {
    match state.relay.store().latest().await {
        Ok(reading) => (StatusCode::OK, Json(serde_json::json!(reading))),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "No readings available" })),
        ),
    }
}

/// GET /api/sensor/history — count + ordered sequence, oldest first
async fn history(State(state): State<Arc<WebState>>) -> Json<serde_json::Value> {
    let readings = state.relay.store().all().await;
    Json(serde_json::json!({
        "count": readings.len(),
        "readings": readings,
    }))
}

/// DELETE /api/sensor/history
async fn clear_history(State(state): State<Arc<WebState>>) -> Json<serde_json::Value> {
    let cleared = state.relay.store().clear().await;
    info!(cleared, "History cleared");
    Json(serde_json::json!({ "success": true, "cleared": cleared }))
}

/// GET /api/sensor/stats
async fn sensor_stats(State(state): State<Arc<WebState>>) -> Json<serde_json::Value> {
    let stats = state.relay.store().stats().await;
    Json(serde_json::json!(stats))
}

/// GET /api/status — server status
async fn api_status(State(state): State<Arc<WebState>>) -> Json<serde_json::Value> {
    let store = state.relay.store().stats().await;
    let hub = state.relay.hub().stats().await;
    let subscribers: Vec<serde_json::Value> = state
        .relay
        .hub()
        .subscribers()
        .await
        .into_iter()
        .map(|s| {
            serde_json::json!({
                "id": s.id.to_string(),
                "addr": s.addr,
                "connected_secs": s.connected_at.elapsed().as_secs(),
            })
        })
        .collect();
    let uptime = state.start_time.elapsed().as_secs();

    Json(serde_json::json!({
        "uptime_secs": uptime,
        "readings_held": store.current_count,
        "readings_received": store.total_received,
        "subscribers": hub.subscribers_connected,
        "subscriber_list": subscribers,
        "messages_delivered": hub.messages_delivered,
        "delivery_failures": hub.delivery_failures,
    }))
}
