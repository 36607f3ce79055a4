//! Canonical telemetry record.
//!
//! A [`Reading`] is created by a source on each successful fetch, travels over
//! the bus as a canonical JSON object and terminates at the store. It is
//! immutable once constructed; two readings are the same iff all four fields
//! match exactly.

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire format of the timestamp (second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Keys every bus payload must carry, in canonical order.
pub const REQUIRED_FIELDS: [&str; 4] = ["timestamp", "temperature", "humidity", "pressure"];

/// Reading values that cannot be represented.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadingError {
    /// NaN or infinite measurement.
    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    /// Relative humidity outside [0, 100].
    #[error("humidity must be within [0, 100], got {0}")]
    HumidityOutOfRange(f64),
}

/// Errors while decoding a bus payload into a [`Reading`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not a JSON object of the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// One or more required keys are absent or null.
    #[error("payload is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// Timestamp does not follow [`TIMESTAMP_FORMAT`].
    #[error("invalid timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Values are present but out of range.
    #[error("invalid reading: {0}")]
    Invalid(#[from] ReadingError),
}

/// One timestamped telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(with = "timestamp_format")]
    timestamp: NaiveDateTime,
    temperature: f64,
    humidity: f64,
    pressure: f64,
}

impl Reading {
    /// Create a reading, truncating the timestamp to whole seconds.
    ///
    /// # Errors
    /// Returns [`ReadingError`] for non-finite values or humidity outside [0, 100].
    pub fn new(
        timestamp: NaiveDateTime,
        temperature: f64,
        humidity: f64,
        pressure: f64,
    ) -> Result<Self, ReadingError> {
        for (field, value) in [
            ("temperature", temperature),
            ("humidity", humidity),
            ("pressure", pressure),
        ] {
            if !value.is_finite() {
                return Err(ReadingError::NonFinite { field, value });
            }
        }
        if !(0.0..=100.0).contains(&humidity) {
            return Err(ReadingError::HumidityOutOfRange(humidity));
        }

        Ok(Self {
            timestamp: timestamp.with_nanosecond(0).unwrap_or(timestamp),
            temperature,
            humidity,
            pressure,
        })
    }

    /// Create a reading stamped with the current local process time.
    pub fn observed_now(
        temperature: f64,
        humidity: f64,
        pressure: f64,
    ) -> Result<Self, ReadingError> {
        Self::new(Local::now().naive_local(), temperature, humidity, pressure)
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Timestamp rendered in [`TIMESTAMP_FORMAT`].
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Temperature in °C.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Relative humidity in %.
    pub fn humidity(&self) -> f64 {
        self.humidity
    }

    /// Pressure in hPa.
    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    /// Canonical JSON encoding (keys: timestamp, temperature, humidity, pressure).
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a bus payload.
    ///
    /// All four keys must be present and non-null; no partial reading is ever
    /// produced.
    pub fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        let wire: WirePayload = serde_json::from_slice(payload)?;

        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .zip([
                wire.timestamp.is_none(),
                wire.temperature.is_none(),
                wire.humidity.is_none(),
                wire.pressure.is_none(),
            ])
            .filter_map(|(field, absent)| absent.then_some(*field))
            .collect();

        let (Some(ts), Some(temperature), Some(humidity), Some(pressure)) =
            (wire.timestamp, wire.temperature, wire.humidity, wire.pressure)
        else {
            return Err(DecodeError::MissingFields(missing));
        };

        let timestamp = NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT)
            .map_err(|source| DecodeError::Timestamp { value: ts, source })?;

        Ok(Self::new(timestamp, temperature, humidity, pressure)?)
    }
}

/// Lenient view of a payload so missing keys can be reported together.
#[derive(Debug, Deserialize)]
struct WirePayload {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
    #[serde(default)]
    pressure: Option<f64>,
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
    }
}
