//! WebSocket handler: registers one subscriber with the hub and
//! forwards its queued messages to the socket.
//!
//! Text protocol (JSON, tagged by `type`):
//!   `connection`     → welcome with live-subscriber count
//!   `sensor_reading` → one accepted reading per push
//!   `pong`           → reply to a client `ping` with server time

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::hub::{ClientMessage, WireMessage, SUBSCRIBER_QUEUE_DEPTH};
use crate::relay::Relay;

/// Handle a single WebSocket subscriber connection.
pub async fn handle_ws(socket: WebSocket, relay: Arc<Relay>, addr: SocketAddr) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
    let id = relay.hub().register(addr.to_string(), tx).await;

    loop {
        tokio::select! {
            // Forward hub messages (welcome + broadcasts) to the client
            queued = rx.recv() => {
                match queued {
                    Some(msg) => {
                        if send_json(&mut ws_tx, &msg).await.is_err() {
                            break;
                        }
                    }
                    // Hub dropped us after a failed delivery
                    None => break,
                }
            }
            // Handle incoming messages from the client
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ping) => {
                                if send_json(&mut ws_tx, &WireMessage::pong()).await.is_err() {
                                    break;
                                }
                            }
                            Err(_) => {
                                debug!(subscriber = %id, "Ignoring unrecognized client message");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {} // Ignore binary/pong
                }
            }
        }
    }

    relay.hub().unregister(id).await;
    debug!(subscriber = %id, peer = %addr, "WebSocket subscriber disconnected");
}

async fn send_json<S>(ws_tx: &mut S, msg: &WireMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to encode stream message");
            // Encoding failure must not produce a partial message
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(text)).await.map_err(|_| ())
}
