//! Error types surfaced by the relay core

use thiserror::Error;

/// Errors reported to producers and consumers.
///
/// Per-subscriber delivery failures are deliberately absent: the hub
/// counts and logs them internally and never raises them to the
/// ingestion caller.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The submitted reading is missing one or more required fields.
    /// Lists every missing field, not just the first.
    #[error("missing required fields: {}", missing.join(", "))]
    InvalidReading { missing: Vec<String> },

    /// A query against a store that holds zero readings.
    #[error("no readings available")]
    Empty,
}
