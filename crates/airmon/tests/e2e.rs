//! E2E regression suite for the airmon relay
//!
//! Serves the real axum app on an ephemeral port and exercises the full
//! pipeline over the wire:
//!
//! - Producer → HTTP POST → validation → history store (query boundary)
//! - Producer → HTTP POST → broadcast hub → WebSocket subscriber
//!
//! Run: `cargo test -p airmon --test e2e`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite;

use airmon::audit::NullAudit;
use airmon::Relay;

// ── Shared helpers ───────────────────────────────────────────────────

/// Start the relay app on an ephemeral port, return the bound address
/// and a handle to the relay.
async fn start_test_server(capacity: usize) -> (SocketAddr, Arc<Relay>) {
    let relay = Arc::new(Relay::new(capacity, Arc::new(NullAudit)));
    let app = airmon::web::router(relay.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, relay)
}

fn reading_body(ppb: f64) -> Value {
    json!({
        "timestamp": "2026-08-29T12:00:00Z",
        "sensor_sn": "042017030201",
        "ppb": ppb,
        "temperature": 22.51,
        "humidity": 41.3,
        "adc_gas": 180_500,
        "adc_temp": 25_100,
        "adc_hum": 15_900,
    })
}

async fn post_reading(client: &reqwest::Client, addr: SocketAddr, body: &Value) -> reqwest::Response {
    client
        .post(format!("http://{}/api/sensor/data", addr))
        .json(body)
        .send()
        .await
        .expect("POST /api/sensor/data failed")
}

async fn get_json(client: &reqwest::Client, addr: SocketAddr, path: &str) -> (u16, Value) {
    let resp = client
        .get(format!("http://{}{}", addr, path))
        .send()
        .await
        .expect("GET failed");
    let status = resp.status().as_u16();
    (status, resp.json().await.expect("Invalid JSON response"))
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Connect a WebSocket subscriber and consume the welcome message.
/// Returning after the welcome guarantees the hub registration is
/// complete before the caller ingests anything.
async fn connect_ws(addr: SocketAddr) -> (WsStream, Value) {
    let url = format!("ws://{}/ws", addr);
    let (mut stream, _response) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("WebSocket connect failed");
    let welcome = next_json(&mut stream, Duration::from_secs(2))
        .await
        .expect("No welcome message");
    (stream, welcome)
}

/// Next JSON text message, or None on timeout/close.
async fn next_json(ws: &mut WsStream, timeout: Duration) -> Option<Value> {
    loop {
        match tokio::time::timeout(timeout, ws.next()).await {
            Ok(Some(Ok(tungstenite::Message::Text(text)))) => {
                return serde_json::from_str(&text).ok();
            }
            Ok(Some(Ok(_))) => continue, // Ignore ping/pong frames
            Ok(Some(Err(_))) | Ok(None) | Err(_) => return None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Query boundary
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread")]
async fn ingest_then_query_latest_and_history() {
    let (addr, _relay) = start_test_server(16).await;
    let client = reqwest::Client::new();

    let resp = post_reading(&client, addr, &reading_body(1.0)).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 1);

    post_reading(&client, addr, &reading_body(2.0)).await;

    let (status, latest) = get_json(&client, addr, "/api/sensor/latest").await;
    assert_eq!(status, 200);
    assert_eq!(latest["ppb"], 2.0);
    assert_eq!(latest["sensor_sn"], "042017030201");

    let (status, history) = get_json(&client, addr, "/api/sensor/history").await;
    assert_eq!(status, 200);
    assert_eq!(history["count"], 2);
    let ppbs: Vec<f64> = history["readings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["ppb"].as_f64().unwrap())
        .collect();
    assert_eq!(ppbs, vec![1.0, 2.0]);

    let (status, stats) = get_json(&client, addr, "/api/sensor/stats").await;
    assert_eq!(status, 200);
    assert_eq!(stats["currentCount"], 2);
    assert_eq!(stats["totalReceived"], 2);
    assert_eq!(stats["capacity"], 16);
}

#[tokio::test(flavor = "multi_thread")]
async fn latest_on_empty_store_is_404() {
    let (addr, _relay) = start_test_server(16).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, addr, "/api/sensor/latest").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "No readings available");
}

#[tokio::test(flavor = "multi_thread")]
async fn history_is_bounded_fifo_over_http() {
    let (addr, _relay) = start_test_server(3).await;
    let client = reqwest::Client::new();

    for ppb in [1.0, 2.0, 3.0, 4.0] {
        post_reading(&client, addr, &reading_body(ppb)).await;
    }

    let (_, history) = get_json(&client, addr, "/api/sensor/history").await;
    assert_eq!(history["count"], 3);
    let ppbs: Vec<f64> = history["readings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["ppb"].as_f64().unwrap())
        .collect();
    assert_eq!(ppbs, vec![2.0, 3.0, 4.0]);

    let (_, stats) = get_json(&client, addr, "/api/sensor/stats").await;
    assert_eq!(stats["totalReceived"], 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_empties_history_but_not_counters() {
    let (addr, _relay) = start_test_server(16).await;
    let client = reqwest::Client::new();

    post_reading(&client, addr, &reading_body(1.0)).await;
    post_reading(&client, addr, &reading_body(2.0)).await;

    let resp = client
        .delete(format!("http://{}/api/sensor/history", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["cleared"], 2);

    let (status, _) = get_json(&client, addr, "/api/sensor/latest").await;
    assert_eq!(status, 404);

    let (_, stats) = get_json(&client, addr, "/api/sensor/stats").await;
    assert_eq!(stats["currentCount"], 0);
    assert_eq!(stats["totalReceived"], 2);
}

// ═══════════════════════════════════════════════════════════════════════
// Ingestion validation
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread")]
async fn rejects_reading_listing_every_missing_field() {
    let (addr, _relay) = start_test_server(16).await;
    let client = reqwest::Client::new();

    let resp = post_reading(&client, addr, &json!({ "sensor_sn": "042017030201" })).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing required fields");
    assert_eq!(body["missing"], json!(["ppb", "temperature", "humidity"]));

    // Nothing was appended
    let (_, stats) = get_json(&client, addr, "/api/sensor/stats").await;
    assert_eq!(stats["totalReceived"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_reading_is_not_broadcast() {
    let (addr, _relay) = start_test_server(16).await;
    let client = reqwest::Client::new();

    let (mut ws, _welcome) = connect_ws(addr).await;

    let mut body = reading_body(1.0);
    body.as_object_mut().unwrap().remove("humidity");
    let resp = post_reading(&client, addr, &body).await;
    assert_eq!(resp.status(), 400);

    assert!(
        next_json(&mut ws, Duration::from_millis(300)).await.is_none(),
        "Subscriber must not observe a rejected reading"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn fills_timestamp_when_producer_omits_it() {
    let (addr, _relay) = start_test_server(16).await;
    let client = reqwest::Client::new();

    let mut body = reading_body(5.0);
    body.as_object_mut().unwrap().remove("timestamp");
    let resp = post_reading(&client, addr, &body).await;
    assert_eq!(resp.status(), 200);

    let (_, latest) = get_json(&client, addr, "/api/sensor/latest").await;
    assert!(!latest["timestamp"].as_str().unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════
// Streaming boundary
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread")]
async fn subscriber_receives_welcome_then_readings() {
    let (addr, _relay) = start_test_server(16).await;
    let client = reqwest::Client::new();

    let (mut ws, welcome) = connect_ws(addr).await;
    assert_eq!(welcome["type"], "connection");
    assert_eq!(welcome["clients"], 1);

    post_reading(&client, addr, &reading_body(42.0)).await;

    let msg = next_json(&mut ws, Duration::from_secs(2)).await.unwrap();
    assert_eq!(msg["type"], "sensor_reading");
    assert_eq!(msg["data"]["ppb"], 42.0);
    // Broadcast timestamp is the push instant, not the reading's own
    assert_ne!(msg["timestamp"], msg["data"]["timestamp"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn late_subscriber_misses_earlier_readings() {
    let (addr, _relay) = start_test_server(16).await;
    let client = reqwest::Client::new();

    let (mut ws_a, _) = connect_ws(addr).await;
    post_reading(&client, addr, &reading_body(1.0)).await;

    // A has seen X before B joins
    let x = next_json(&mut ws_a, Duration::from_secs(2)).await.unwrap();
    assert_eq!(x["data"]["ppb"], 1.0);

    let (mut ws_b, welcome_b) = connect_ws(addr).await;
    assert_eq!(welcome_b["clients"], 2);
    post_reading(&client, addr, &reading_body(2.0)).await;

    let y = next_json(&mut ws_a, Duration::from_secs(2)).await.unwrap();
    assert_eq!(y["data"]["ppb"], 2.0);

    let b_first = next_json(&mut ws_b, Duration::from_secs(2)).await.unwrap();
    assert_eq!(b_first["data"]["ppb"], 2.0, "B must not see X");
}

#[tokio::test(flavor = "multi_thread")]
async fn ping_is_answered_with_pong() {
    let (addr, _relay) = start_test_server(16).await;

    let (mut ws, _welcome) = connect_ws(addr).await;
    ws.send(tungstenite::Message::Text(r#"{"type":"ping"}"#.to_string()))
        .await
        .unwrap();

    let msg = next_json(&mut ws, Duration::from_secs(2)).await.unwrap();
    assert_eq!(msg["type"], "pong");
    assert!(!msg["timestamp"].as_str().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn disconnected_subscriber_leaves_the_live_set() {
    let (addr, relay) = start_test_server(16).await;
    let client = reqwest::Client::new();

    let (ws, _welcome) = connect_ws(addr).await;
    assert_eq!(relay.hub().subscriber_count().await, 1);

    drop(ws);
    // Give the server side a moment to observe the close
    for _ in 0..20 {
        if relay.hub().subscriber_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(relay.hub().subscriber_count().await, 0);

    // Ingestion proceeds with nobody listening
    let resp = post_reading(&client, addr, &reading_body(3.0)).await;
    assert_eq!(resp.status(), 200);
}
