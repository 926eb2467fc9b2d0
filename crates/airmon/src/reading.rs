//! Sensor reading types and ingestion validation
//!
//! The DGS2 sensor reports `sensor_sn, ppb, temperature, humidity` plus
//! the raw ADC channel values. The reader process parses the serial line
//! and POSTs it here as JSON; [`ReadingPayload`] is that loose record and
//! [`Reading`] is the validated form the rest of the relay works with.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// One timestamped gas-sensor measurement.
///
/// `timestamp`, `sensor_sn`, `ppb`, `temperature`, and `humidity` are
/// always present once a reading has been accepted. Readings are
/// immutable after that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// RFC 3339 instant. Defaults to ingestion time when the producer
    /// omits it.
    pub timestamp: String,
    /// Sensor serial number
    pub sensor_sn: String,
    /// Gas concentration in parts per billion
    pub ppb: f64,
    /// Temperature in °C
    pub temperature: f64,
    /// Relative humidity in %
    pub humidity: f64,
    /// Raw gas ADC channel
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub adc_gas: Option<i64>,
    /// Raw temperature ADC channel
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub adc_temp: Option<i64>,
    /// Raw humidity ADC channel
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub adc_hum: Option<i64>,
}

/// Raw ingestion record as submitted by the producer.
///
/// Every field is optional so that validation can report the complete
/// set of missing fields instead of failing on the first one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadingPayload {
    pub timestamp: Option<String>,
    pub sensor_sn: Option<String>,
    pub ppb: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub adc_gas: Option<i64>,
    pub adc_temp: Option<i64>,
    pub adc_hum: Option<i64>,
}

impl ReadingPayload {
    /// Validate the payload into a [`Reading`].
    ///
    /// Fails with [`RelayError::InvalidReading`] listing every missing
    /// required field. `timestamp` is not required and is filled with
    /// the current UTC instant when absent. Numeric ranges are not
    /// checked; out-of-range physical values are left to downstream
    /// interpretation.
    pub fn validate(self) -> Result<Reading, RelayError> {
        let mut missing = Vec::new();
        if self.sensor_sn.is_none() {
            missing.push("sensor_sn".to_string());
        }
        if self.ppb.is_none() {
            missing.push("ppb".to_string());
        }
        if self.temperature.is_none() {
            missing.push("temperature".to_string());
        }
        if self.humidity.is_none() {
            missing.push("humidity".to_string());
        }

        match (self.sensor_sn, self.ppb, self.temperature, self.humidity) {
            (Some(sensor_sn), Some(ppb), Some(temperature), Some(humidity)) => Ok(Reading {
                timestamp: self
                    .timestamp
                    .unwrap_or_else(|| Utc::now().to_rfc3339()),
                sensor_sn,
                ppb,
                temperature,
                humidity,
                adc_gas: self.adc_gas,
                adc_temp: self.adc_temp,
                adc_hum: self.adc_hum,
            }),
            _ => Err(RelayError::InvalidReading { missing }),
        }
    }
}
