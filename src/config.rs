//! Runtime configuration
//!
//! Every component receives its settings from one [`Config`] value built at
//! startup. Values come from compiled defaults, then an optional TOML file,
//! then command-line overrides applied by the binary.
//!
//! ```toml
//! [database]
//! path = "rf_scanner.db"
//!
//! [schedule]
//! quick_secs = 60
//! deep_secs = 180
//!
//! [alerts.high_power]
//! threshold_dbm = -40.0
//! ```

use crate::alerts::Severity;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "rf_scanner.db";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub acquisition: AcquisitionConfig,
    pub schedule: ScheduleConfig,
    pub alerts: AlertConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: u32,
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            pool_size: 5,
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub sample_rate_hz: f64,
    /// Samples per acquisition, also the FFT length
    pub fft_size: usize,
    /// Minimum peak-over-noise-floor margin that counts as a detection
    pub detection_snr_db: f64,
    /// Candidate frequencies checked by the quick pass
    pub quick_frequencies_hz: Vec<f64>,
    pub deep_range_hz: [f64; 2],
    pub deep_segments: usize,
    pub spectral_range_hz: [f64; 2],
    /// Number of evenly spaced centres in each sweep range
    pub sweep_steps: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 2e6,
            fft_size: 1024,
            detection_snr_db: 10.0,
            quick_frequencies_hz: vec![88e6, 433e6, 868e6, 2.4e9, 5.8e9],
            deep_range_hz: [100e6, 3e9],
            deep_segments: 3,
            spectral_range_hz: [50e6, 6e9],
            sweep_steps: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub quick_secs: u64,
    pub deep_secs: u64,
    pub spectral_secs: u64,
    pub report_secs: u64,
    /// Scheduler loop resolution; also bounds stop latency
    pub tick_millis: u64,
    /// Run the quick and deep passes once as soon as the session opens
    pub run_scans_at_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            quick_secs: 60,
            deep_secs: 180,
            spectral_secs: 300,
            report_secs: 600,
            tick_millis: 1000,
            run_scans_at_start: true,
        }
    }
}

impl ScheduleConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Cadence of `alerts --watch` and the server's background evaluation
    pub interval_secs: u64,
    pub high_power: HighPowerRule,
    pub unknown_signal: UnknownSignalRule,
    pub unusual_frequency: UnusualFrequencyRule,
    pub signal_burst: SignalBurstRule,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            high_power: HighPowerRule::default(),
            unknown_signal: UnknownSignalRule::default(),
            unusual_frequency: UnusualFrequencyRule::default(),
            signal_burst: SignalBurstRule::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HighPowerRule {
    pub threshold_dbm: f64,
    pub window_secs: i64,
    pub severity: Severity,
    pub message: String,
}

impl Default for HighPowerRule {
    fn default() -> Self {
        Self {
            threshold_dbm: -40.0,
            window_secs: 5 * 60,
            severity: Severity::High,
            message: "HIGH POWER SIGNAL DETECTED".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UnknownSignalRule {
    pub window_secs: i64,
    pub severity: Severity,
    pub message: String,
}

impl Default for UnknownSignalRule {
    fn default() -> Self {
        Self {
            window_secs: 10 * 60,
            severity: Severity::Medium,
            message: "UNKNOWN SIGNAL TYPE DETECTED".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UnusualFrequencyRule {
    pub min_freq_mhz: f64,
    pub window_secs: i64,
    pub severity: Severity,
    pub message: String,
}

impl Default for UnusualFrequencyRule {
    fn default() -> Self {
        Self {
            min_freq_mhz: 5000.0,
            window_secs: 15 * 60,
            severity: Severity::Low,
            message: "UNUSUAL FREQUENCY DETECTED".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalBurstRule {
    pub count_threshold: usize,
    pub time_window_secs: i64,
    /// How far back bursts are searched for
    pub lookback_secs: i64,
    pub severity: Severity,
    pub message: String,
}

impl Default for SignalBurstRule {
    fn default() -> Self {
        Self {
            count_threshold: 3,
            time_window_secs: 10,
            lookback_secs: 15 * 60,
            severity: Severity::Medium,
            message: "SIGNAL BURST DETECTED".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
    pub detection_probability: f64,
    pub power_range_dbm: [f64; 2],
    pub noise_floor_dbm: f64,
    /// Absolute power of a unit-amplitude tone
    pub full_scale_dbm: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            detection_probability: 0.3,
            power_range_dbm: [-80.0, -30.0],
            noise_floor_dbm: -95.0,
            full_scale_dbm: -10.0,
        }
    }
}

impl Config {
    /// Load a TOML file; missing keys fall back to defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.schedule;
        for (name, secs) in [
            ("quick_secs", s.quick_secs),
            ("deep_secs", s.deep_secs),
            ("spectral_secs", s.spectral_secs),
            ("report_secs", s.report_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("schedule.{} must be positive", name)));
            }
        }
        if s.tick_millis == 0 {
            return Err(ConfigError::Invalid("schedule.tick_millis must be positive".into()));
        }

        let a = &self.acquisition;
        if a.fft_size < 16 {
            return Err(ConfigError::Invalid(format!(
                "acquisition.fft_size must be at least 16, got {}",
                a.fft_size
            )));
        }
        if a.sample_rate_hz <= 0.0 {
            return Err(ConfigError::Invalid("acquisition.sample_rate_hz must be positive".into()));
        }
        if a.quick_frequencies_hz.is_empty() {
            return Err(ConfigError::Invalid(
                "acquisition.quick_frequencies_hz must not be empty".into(),
            ));
        }
        if a.sweep_steps == 0 {
            return Err(ConfigError::Invalid("acquisition.sweep_steps must be positive".into()));
        }

        let sim = &self.simulator;
        if !(0.0..=1.0).contains(&sim.detection_probability) {
            return Err(ConfigError::Invalid(format!(
                "simulator.detection_probability must be within [0, 1], got {}",
                sim.detection_probability
            )));
        }
        if sim.power_range_dbm[0] > sim.power_range_dbm[1] {
            return Err(ConfigError::Invalid("simulator.power_range_dbm is inverted".into()));
        }

        self.alerts.validate()
    }
}

/// Longest alert window accepted; larger spans overflow timestamp arithmetic
pub const MAX_ALERT_WINDOW_SECS: i64 = 366 * 24 * 60 * 60;

impl AlertConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid("alerts.interval_secs must be positive".into()));
        }
        if self.signal_burst.count_threshold == 0 {
            return Err(ConfigError::Invalid(
                "alerts.signal_burst.count_threshold must be positive".into(),
            ));
        }

        for (name, secs) in [
            ("high_power.window_secs", self.high_power.window_secs),
            ("unknown_signal.window_secs", self.unknown_signal.window_secs),
            ("unusual_frequency.window_secs", self.unusual_frequency.window_secs),
            ("signal_burst.time_window_secs", self.signal_burst.time_window_secs),
            ("signal_burst.lookback_secs", self.signal_burst.lookback_secs),
        ] {
            if !(1..=MAX_ALERT_WINDOW_SECS).contains(&secs) {
                return Err(ConfigError::Invalid(format!(
                    "alerts.{} must be within 1..={}, got {}",
                    name, MAX_ALERT_WINDOW_SECS, secs
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cadence() {
        let config = Config::default();
        assert_eq!(config.schedule.quick_secs, 60);
        assert_eq!(config.schedule.deep_secs, 180);
        assert_eq!(config.schedule.spectral_secs, 300);
        assert_eq!(config.schedule.report_secs, 600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [schedule]
            quick_secs = 5

            [alerts.high_power]
            threshold_dbm = -50.0
            "#,
        )
        .unwrap();

        assert_eq!(config.schedule.quick_secs, 5);
        assert_eq!(config.schedule.deep_secs, 180);
        assert_eq!(config.alerts.high_power.threshold_dbm, -50.0);
        assert_eq!(config.alerts.high_power.severity, Severity::High);
        assert_eq!(config.acquisition.fft_size, 1024);
    }

    #[test]
    fn test_zero_period_rejected() {
        let err = Config::from_toml("[schedule]\ndeep_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("deep_secs"));
    }

    #[test]
    fn test_probability_out_of_range_rejected() {
        let err = Config::from_toml("[simulator]\ndetection_probability = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_oversized_alert_window_rejected() {
        let err = Config::from_toml("[alerts.high_power]\nwindow_secs = 9223372036854775807\n")
            .unwrap_err();
        assert!(err.to_string().contains("high_power.window_secs"));

        let err = Config::from_toml("[alerts.signal_burst]\nlookback_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("lookback_secs"));

        let err = Config::from_toml("[alerts.unknown_signal]\nwindow_secs = -5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_largest_alert_window_accepted() {
        let text = format!("[alerts.unusual_frequency]\nwindow_secs = {}\n", MAX_ALERT_WINDOW_SECS);
        assert!(Config::from_toml(&text).is_ok());
    }

    #[test]
    fn test_zero_alert_interval_rejected() {
        let err = Config::from_toml("[alerts]\ninterval_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("interval_secs"));
    }

    #[test]
    fn test_severity_parses_uppercase() {
        let config = Config::from_toml("[alerts.signal_burst]\nseverity = \"HIGH\"\n").unwrap();
        assert_eq!(config.alerts.signal_burst.severity, Severity::High);
    }
}
