//! Airmon — real-time gas-sensor telemetry relay
//!
//! A sensor reader pushes periodic DGS2-style readings over HTTP. The
//! relay validates each reading, retains a bounded recent history in
//! memory, and fans every accepted reading out to all live WebSocket
//! subscribers:
//!
//! - **`reading`**: the Reading type and ingestion validation
//! - **`store`**: bounded FIFO history with copy-out queries
//! - **`hub`**: live subscriber set and broadcast fan-out
//! - **`relay`**: the ingestion pipeline tying the pieces together
//! - **`audit`**: append-only CSV log of accepted readings
//! - **`web`**: axum HTTP + WebSocket surfaces

pub mod audit;
mod error;
pub mod hub;
mod reading;
mod relay;
pub mod store;
pub mod web;

pub use error::RelayError;
pub use hub::{BroadcastReport, Hub, HubStats, SubscriberId, WireMessage};
pub use reading::{Reading, ReadingPayload};
pub use relay::Relay;
pub use store::{HistoryStore, StoreStats, DEFAULT_CAPACITY};
