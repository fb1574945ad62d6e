//! Activity reports over recent detections
//!
//! - **JSON**: full report, machine-readable
//! - **CSV**: one row per detected signal, for spreadsheets
//! - **TXT**: the human-readable summary
//!
//! # Usage
//!
//! ```ignore
//! use rfwatch::report;
//!
//! let report = report::SignalReport::build(&db, &engine, 24)?;
//! report::generate("daily.json", &report)?;  // JSON
//! report::generate("daily.csv", &report)?;   // CSV
//! report::generate("daily.txt", &report)?;   // text
//! ```

pub mod csv;
pub mod json;
pub mod text;

use crate::alerts::{Alert, AlertEngine};
use crate::db::{ActivityStats, Database, HourlyActivity, SignalTypeStats, StoredSignal};
use crate::error::RepoError;
use crate::model::format_timestamp;
use crate::repository::Repository;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::io;
use std::path::Path;

/// Generate a report in the appropriate format based on file extension
pub fn generate<P: AsRef<Path>>(path: P, report: &SignalReport) -> io::Result<()> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mut file = std::fs::File::create(path)?;

    match ext.as_str() {
        "json" => json::write(&mut file, report),
        "txt" | "text" => text::write(&mut file, report),
        _ => csv::write(&mut file, report),
    }
}

/// Everything recorded in the reporting period
#[derive(Debug, Clone, Serialize)]
pub struct SignalReport {
    pub generated_at: String,
    pub period_start: String,
    pub period_hours: i64,
    pub summary: ActivityStats,
    pub signal_breakdown: Vec<SignalTypeStats>,
    pub hourly_activity: Vec<HourlyActivity>,
    pub alerts: Vec<Alert>,
    /// Most recent first
    pub signals: Vec<StoredSignal>,
}

impl SignalReport {
    /// Report on the last `hours` hours
    pub fn build(db: &Database, engine: &AlertEngine, hours: i64) -> Result<Self, RepoError> {
        Self::build_at(db, engine, Utc::now(), hours)
    }

    pub fn build_at(
        db: &Database,
        engine: &AlertEngine,
        now: DateTime<Utc>,
        hours: i64,
    ) -> Result<Self, RepoError> {
        let since = now - Duration::hours(hours.max(0));
        let generated_at = format_timestamp(now);
        let signals = db
            .signals_since(since)?
            .into_iter()
            .filter(|s| s.timestamp <= generated_at)
            .collect();

        Ok(Self {
            generated_at,
            period_start: format_timestamp(since),
            period_hours: hours,
            summary: db.activity_stats(since)?,
            signal_breakdown: db.signal_breakdown(since)?,
            hourly_activity: db.hourly_activity(since)?,
            alerts: engine.evaluate_at(now)?,
            signals,
        })
    }

    /// "-70.0 to -30.0 dBm", or "n/a" with no signals
    pub fn power_range(&self) -> String {
        match (self.summary.min_power_dbm, self.summary.max_power_dbm) {
            (Some(min), Some(max)) => format!("{:.1} to {:.1} dBm", min, max),
            _ => "n/a".to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::AlertConfig;
    use crate::model::DetectedSignal;
    use std::sync::Arc;
    use tempfile::TempDir;

    pub(crate) fn sample_report() -> (TempDir, SignalReport) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_at(dir.path().join("rf.db")).unwrap());
        let session = db.create_session(60).unwrap();
        let now = Utc::now();

        for (mins, mhz, dbm, kind) in [
            (2, 2400.0, -35.0, "WIFI"),
            (8, 1200.0, -70.0, "UNKNOWN"),
            (20, 433.9, -62.5, "LORA"),
        ] {
            let signal = DetectedSignal {
                timestamp: now - Duration::minutes(mins),
                frequency_hz: mhz * 1e6,
                power_dbm: dbm,
                signal_type: kind.to_string(),
                confidence: 0.8,
                bandwidth_hz: 2e6,
                modulation: Some("CW".to_string()),
            };
            db.record_signal(session, &signal).unwrap();
        }

        let engine = AlertEngine::new(db.clone(), AlertConfig::default());
        let report = SignalReport::build_at(&db, &engine, now, 24).unwrap();
        (dir, report)
    }

    // ==========================================================================
    // REPORT CONTENT TESTS
    // ==========================================================================

    #[test]
    fn test_report_totals() {
        let (_dir, report) = sample_report();

        assert_eq!(report.summary.total_signals, 3);
        assert_eq!(report.summary.unique_signal_types, 3);
        assert_eq!(report.signals.len(), 3);
        assert_eq!(report.signals[0].signal_type, "WIFI", "most recent first");
        assert_eq!(report.power_range(), "-70.0 to -35.0 dBm");
    }

    #[test]
    fn test_report_includes_alerts() {
        let (_dir, report) = sample_report();

        assert_eq!(report.alerts.len(), 2);
        assert!(report.alerts[0].message.contains("-35.0 dBm at 2400.0 MHz"));
        assert!(report.alerts[1].message.contains("1200.0 MHz"));
    }

    #[test]
    fn test_generate_picks_format_by_extension() {
        let (dir, report) = sample_report();

        for name in ["r.json", "r.csv", "r.txt"] {
            let path = dir.path().join(name);
            generate(&path, &report).unwrap();
            assert!(std::fs::metadata(&path).unwrap().len() > 0, "{} is empty", name);
        }

        let json = std::fs::read_to_string(dir.path().join("r.json")).unwrap();
        assert!(json.trim_start().starts_with('{'));
        let csv = std::fs::read_to_string(dir.path().join("r.csv")).unwrap();
        assert!(csv.starts_with("timestamp,"));
    }

    #[test]
    fn test_empty_period_power_range() {
        let (_dir, mut report) = sample_report();
        report.summary.min_power_dbm = None;
        report.summary.max_power_dbm = None;
        assert_eq!(report.power_range(), "n/a");
    }
}
