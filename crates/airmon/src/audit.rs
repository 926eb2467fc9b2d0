//! Append-only audit log for accepted readings
//!
//! Pure side-effect sink: the relay records every accepted reading here
//! after it lands in the history. Failures are logged by the caller and
//! never affect ingestion.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::reading::Reading;

/// Sink for accepted readings.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one accepted reading.
    async fn record(&self, reading: &Reading) -> Result<()>;
}

/// Sink that discards everything.
pub struct NullAudit;

#[async_trait]
impl AuditSink for NullAudit {
    async fn record(&self, _reading: &Reading) -> Result<()> {
        Ok(())
    }
}

const CSV_HEADER: &str = "timestamp,sensor_sn,ppb,temperature,humidity,adc_gas,adc_temp,adc_hum";

/// Default cap on recorded entries, matching the sensor reader's own
/// local log.
pub const DEFAULT_MAX_ENTRIES: u64 = 500;

struct CsvAuditState {
    entries_written: u64,
    limit_logged: bool,
}

/// Append-only CSV file sink.
///
/// Writes the header when it creates the file and one line per reading
/// after that. Stops recording after `max_entries` lines; the relay
/// keeps running, the log just stops growing.
pub struct CsvAudit {
    path: PathBuf,
    max_entries: u64,
    state: Mutex<CsvAuditState>,
}

impl CsvAudit {
    pub fn new(path: impl Into<PathBuf>, max_entries: u64) -> Self {
        Self {
            path: path.into(),
            max_entries,
            state: Mutex::new(CsvAuditState {
                entries_written: 0,
                limit_logged: false,
            }),
        }
    }

    fn format_line(reading: &Reading) -> String {
        fn adc(value: Option<i64>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }
        format!(
            "{},{},{},{},{},{},{},{}",
            reading.timestamp,
            reading.sensor_sn,
            reading.ppb,
            reading.temperature,
            reading.humidity,
            adc(reading.adc_gas),
            adc(reading.adc_temp),
            adc(reading.adc_hum),
        )
    }
}

#[async_trait]
impl AuditSink for CsvAudit {
    async fn record(&self, reading: &Reading) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.entries_written >= self.max_entries {
            if !state.limit_logged {
                info!(
                    limit = self.max_entries,
                    path = %self.path.display(),
                    "Audit log entry limit reached, no further entries will be recorded"
                );
                state.limit_logged = true;
            }
            return Ok(());
        }

        let new_file = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open audit log {}", self.path.display()))?;

        if new_file {
            writeln!(file, "{}", CSV_HEADER).context("Failed to write audit log header")?;
        }
        writeln!(file, "{}", Self::format_line(reading))
            .context("Failed to append audit log entry")?;

        state.entries_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(ppb: f64) -> Reading {
        Reading {
            timestamp: "2026-08-29T12:00:00Z".to_string(),
            sensor_sn: "042017030201".to_string(),
            ppb,
            temperature: 22.5,
            humidity: 41.0,
            adc_gas: Some(180_500),
            adc_temp: Some(25_100),
            adc_hum: Some(15_900),
        }
    }

    #[tokio::test]
    async fn writes_header_then_one_line_per_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        let audit = CsvAudit::new(&path, DEFAULT_MAX_ENTRIES);

        audit.record(&reading(1.0)).await.unwrap();
        audit.record(&reading(2.0)).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "2026-08-29T12:00:00Z,042017030201,1,22.5,41,180500,25100,15900"
        );
    }

    #[tokio::test]
    async fn absent_adc_fields_are_empty_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        let audit = CsvAudit::new(&path, DEFAULT_MAX_ENTRIES);

        let mut r = reading(3.5);
        r.adc_gas = None;
        r.adc_temp = None;
        r.adc_hum = None;
        audit.record(&r).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.lines().nth(1).unwrap().ends_with(",41,,,"));
    }

    #[tokio::test]
    async fn stops_recording_at_max_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        let audit = CsvAudit::new(&path, 2);

        for i in 0..5 {
            audit.record(&reading(i as f64)).await.unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        // Header + exactly max_entries lines
        assert_eq!(contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn appends_to_existing_file_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");

        let audit = CsvAudit::new(&path, DEFAULT_MAX_ENTRIES);
        audit.record(&reading(1.0)).await.unwrap();

        // New sink over the same file, as after a process restart
        let audit = CsvAudit::new(&path, DEFAULT_MAX_ENTRIES);
        audit.record(&reading(2.0)).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let headers = contents
            .lines()
            .filter(|l| *l == CSV_HEADER)
            .count();
        assert_eq!(headers, 1);
        assert_eq!(contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn unwritable_path_errors() {
        let audit = CsvAudit::new("/nonexistent-dir/readings.csv", DEFAULT_MAX_ENTRIES);
        assert!(audit.record(&reading(1.0)).await.is_err());
    }
}
