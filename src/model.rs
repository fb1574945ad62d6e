//! Records produced by the pipeline before they are persisted

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Signal type tag emitted when a detection matches no known allocation.
/// Alerting treats it as significant, so nothing upstream may filter it.
pub const UNKNOWN_SIGNAL_TYPE: &str = "UNKNOWN";

/// Render a timestamp the way every table stores it: UTC, microseconds, `Z`.
/// Fixed width, so string order is time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// A classified detection, ready to be appended to a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedSignal {
    pub timestamp: DateTime<Utc>,
    pub frequency_hz: f64,
    pub power_dbm: f64,
    pub signal_type: String,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
    pub bandwidth_hz: f64,
    pub modulation: Option<String>,
}

impl DetectedSignal {
    pub fn frequency_mhz(&self) -> f64 {
        self.frequency_hz / 1e6
    }

    pub fn bandwidth_mhz(&self) -> f64 {
        self.bandwidth_hz / 1e6
    }

    pub fn is_unknown(&self) -> bool {
        self.signal_type == UNKNOWN_SIGNAL_TYPE
    }
}

/// Spectrum metrics for one acquisition. Not tied to any session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumAnalysis {
    pub timestamp: DateTime<Utc>,
    pub center_frequency_hz: f64,
    pub bandwidth_hz: f64,
    pub peak_power_dbm: f64,
    pub mean_power_dbm: f64,
    pub peak_frequency_bin: usize,
    pub total_bands: usize,
    pub noise_floor_dbm: f64,
}

/// Feature vector extracted from a waveform, with the class it was given
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub timestamp: DateTime<Utc>,
    pub features: Vec<f64>,
    pub signal_class: String,
    pub model_used: String,
    pub confidence: f64,
}

/// One classifier invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub timestamp: DateTime<Utc>,
    pub modulation: String,
    pub confidence: f64,
    pub input_shape: String,
    pub prediction_time_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip_keeps_micros() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap()
            + chrono::Duration::microseconds(42);
        let text = format_timestamp(ts);
        assert_eq!(text, "2026-03-01T12:30:05.000042Z");
        assert_eq!(parse_timestamp(&text), Some(ts));
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let early = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert!(format_timestamp(early) < format_timestamp(late));
    }

    #[test]
    fn test_unit_conversions() {
        let signal = DetectedSignal {
            timestamp: Utc::now(),
            frequency_hz: 2.4e9,
            power_dbm: -45.5,
            signal_type: "WIFI".into(),
            confidence: 0.85,
            bandwidth_hz: 20e6,
            modulation: Some("OFDM".into()),
        };
        assert_eq!(signal.frequency_mhz(), 2400.0);
        assert_eq!(signal.bandwidth_mhz(), 20.0);
        assert!(!signal.is_unknown());
    }

    #[test]
    fn test_log_level_strings() {
        assert_eq!(LogLevel::Info.as_str(), "INFO");
        assert_eq!(LogLevel::Warning.to_string(), "WARNING");
    }
}
