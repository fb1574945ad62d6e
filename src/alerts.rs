//! Threshold alerts over recent detections
//!
//! The engine keeps no state between passes. Every [`AlertEngine::evaluate`]
//! re-reads the repository and rebuilds the full list, so two passes over an
//! unchanged store return the same alerts in the same order.
//!
//! Rules, in output order:
//!
//! 1. **High power**: power above a dBm threshold
//! 2. **Unknown signal**: classifier could not name the signal
//! 3. **Unusual frequency**: above a MHz floor
//! 4. **Signal burst**: at least N detections inside a sliding window
//!
//! Within a rule, most recent first.

use crate::config::{AlertConfig, MAX_ALERT_WINDOW_SECS};
use crate::db::StoredSignal;
use crate::error::RepoError;
use crate::model::{format_timestamp, parse_timestamp, UNKNOWN_SIGNAL_TYPE};
use crate::repository::Repository;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighPower,
    UnknownSignal,
    UnusualFrequency,
    SignalBurst,
}

/// A derived alert. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    pub severity: Severity,
    /// Timestamp of the originating signal (last signal of a burst)
    pub timestamp: String,
}

/// A run of detections that kept the window at or above the threshold.
/// Indices are into the ascending time slice given to [`detect_bursts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Burst {
    pub first: usize,
    pub last: usize,
    /// Largest number of detections seen inside one window during the run
    pub peak_count: usize,
}

/// Sliding-window burst detection over ascending times.
///
/// A window holds every detection no more than `window` older than the
/// newest one. Consecutive positions where the window holds at least
/// `count_threshold` detections form one burst.
pub fn detect_bursts(times: &[DateTime<Utc>], count_threshold: usize, window: Duration) -> Vec<Burst> {
    let mut bursts = Vec::new();
    if count_threshold == 0 {
        return bursts;
    }

    let mut left = 0;
    let mut current: Option<Burst> = None;

    for right in 0..times.len() {
        while times[right] - times[left] > window {
            left += 1;
        }
        let count = right - left + 1;

        if count >= count_threshold {
            let burst = current.get_or_insert(Burst {
                first: left,
                last: right,
                peak_count: count,
            });
            burst.last = right;
            burst.peak_count = burst.peak_count.max(count);
        } else if let Some(done) = current.take() {
            bursts.push(done);
        }
    }
    bursts.extend(current);
    bursts
}

/// Rule window as a duration, clamped to what timestamp arithmetic can hold
fn window(secs: i64) -> Duration {
    Duration::seconds(secs.clamp(0, MAX_ALERT_WINDOW_SECS))
}

pub struct AlertEngine {
    repo: Arc<dyn Repository>,
    rules: AlertConfig,
}

impl AlertEngine {
    pub fn new(repo: Arc<dyn Repository>, rules: AlertConfig) -> Self {
        Self { repo, rules }
    }

    pub fn rules(&self) -> &AlertConfig {
        &self.rules
    }

    pub fn evaluate(&self) -> Result<Vec<Alert>, RepoError> {
        self.evaluate_at(Utc::now())
    }

    /// Evaluate every rule as of `now`
    pub fn evaluate_at(&self, now: DateTime<Utc>) -> Result<Vec<Alert>, RepoError> {
        let rules = &self.rules;
        let widest = [
            rules.high_power.window_secs,
            rules.unknown_signal.window_secs,
            rules.unusual_frequency.window_secs,
            rules.signal_burst.lookback_secs,
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        let now_text = format_timestamp(now);
        // Most recent first
        let signals: Vec<StoredSignal> = self
            .repo
            .signals_since(now - window(widest))?
            .into_iter()
            .filter(|s| s.timestamp <= now_text)
            .collect();

        let within = |secs: i64| {
            let cutoff = format_timestamp(now - window(secs));
            signals.iter().filter(move |s| s.timestamp > cutoff)
        };

        let mut alerts = Vec::new();

        let high = &rules.high_power;
        alerts.extend(
            within(high.window_secs)
                .filter(|s| s.power_dbm > high.threshold_dbm)
                .map(|s| Alert {
                    kind: AlertKind::HighPower,
                    message: format!(
                        "{}: {:.1} dBm at {:.1} MHz",
                        high.message, s.power_dbm, s.frequency_mhz
                    ),
                    severity: high.severity,
                    timestamp: s.timestamp.clone(),
                }),
        );

        let unknown = &rules.unknown_signal;
        alerts.extend(
            within(unknown.window_secs)
                .filter(|s| s.signal_type == UNKNOWN_SIGNAL_TYPE)
                .map(|s| Alert {
                    kind: AlertKind::UnknownSignal,
                    message: format!("{}: {:.1} MHz", unknown.message, s.frequency_mhz),
                    severity: unknown.severity,
                    timestamp: s.timestamp.clone(),
                }),
        );

        let unusual = &rules.unusual_frequency;
        alerts.extend(
            within(unusual.window_secs)
                .filter(|s| s.frequency_mhz > unusual.min_freq_mhz)
                .map(|s| Alert {
                    kind: AlertKind::UnusualFrequency,
                    message: format!("{}: {:.1} MHz", unusual.message, s.frequency_mhz),
                    severity: unusual.severity,
                    timestamp: s.timestamp.clone(),
                }),
        );

        alerts.extend(self.burst_alerts(within(rules.signal_burst.lookback_secs)));

        debug!(alerts = alerts.len(), signals = signals.len(), "alert pass");
        Ok(alerts)
    }

    fn burst_alerts<'a>(&self, recent: impl Iterator<Item = &'a StoredSignal>) -> Vec<Alert> {
        let rule = &self.rules.signal_burst;

        let mut timeline: Vec<(DateTime<Utc>, &StoredSignal)> = recent
            .filter_map(|s| parse_timestamp(&s.timestamp).map(|t| (t, s)))
            .collect();
        timeline.reverse();
        let times: Vec<DateTime<Utc>> = timeline.iter().map(|(t, _)| *t).collect();

        detect_bursts(&times, rule.count_threshold, window(rule.time_window_secs))
            .into_iter()
            .rev()
            .map(|burst| Alert {
                kind: AlertKind::SignalBurst,
                message: format!(
                    "{}: {} signals within {}s",
                    rule.message, burst.peak_count, rule.time_window_secs
                ),
                severity: rule.severity,
                timestamp: timeline[burst.last].1.timestamp.clone(),
            })
            .collect()
    }

    /// Evaluate every `interval` until `stop` is set, handing each pass to
    /// `sink`. Read failures are logged and retried on the next pass.
    pub fn watch<F>(&self, interval: std::time::Duration, stop: &AtomicBool, mut sink: F)
    where
        F: FnMut(&[Alert]),
    {
        let slice = std::time::Duration::from_millis(200);
        while !stop.load(Ordering::SeqCst) {
            match self.evaluate() {
                Ok(alerts) => sink(&alerts),
                Err(e) => warn!(error = %e, "alert evaluation failed"),
            }

            let mut waited = std::time::Duration::ZERO;
            while waited < interval && !stop.load(Ordering::SeqCst) {
                let step = slice.min(interval - waited);
                thread::sleep(step);
                waited += step;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::DetectedSignal;
    use tempfile::TempDir;

    fn engine() -> (TempDir, Arc<Database>, AlertEngine, i32) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_at(dir.path().join("rf.db")).unwrap());
        let session = db.create_session(600).unwrap();
        let engine = AlertEngine::new(db.clone(), AlertConfig::default());
        (dir, db, engine, session)
    }

    fn signal(at: DateTime<Utc>, mhz: f64, dbm: f64, kind: &str) -> DetectedSignal {
        DetectedSignal {
            timestamp: at,
            frequency_hz: mhz * 1e6,
            power_dbm: dbm,
            signal_type: kind.to_string(),
            confidence: 0.8,
            bandwidth_hz: 1e6,
            modulation: None,
        }
    }

    fn seconds(base: DateTime<Utc>, offsets: &[i64]) -> Vec<DateTime<Utc>> {
        offsets.iter().map(|s| base + Duration::seconds(*s)).collect()
    }

    // ==========================================================================
    // BURST DETECTION TESTS
    // ==========================================================================
    //
    // The window is inclusive: detections exactly `window` apart share it.
    // ==========================================================================

    #[test]
    fn test_burst_fires_on_dense_run() {
        let times = seconds(Utc::now(), &[0, 2, 4, 6]);
        let bursts = detect_bursts(&times, 3, Duration::seconds(10));

        assert_eq!(bursts.len(), 1);
        assert_eq!(bursts[0].peak_count, 4);
        assert_eq!(bursts[0].last, 3);
    }

    #[test]
    fn test_burst_ignores_spread_signals() {
        let times = seconds(Utc::now(), &[0, 5, 11]);
        assert!(detect_bursts(&times, 3, Duration::seconds(10)).is_empty());
    }

    #[test]
    fn test_separate_runs_are_separate_bursts() {
        let times = seconds(Utc::now(), &[0, 1, 2, 100, 101, 102]);
        let bursts = detect_bursts(&times, 3, Duration::seconds(10));

        assert_eq!(bursts.len(), 2);
        assert_eq!((bursts[0].first, bursts[0].last), (0, 2));
        assert_eq!((bursts[1].first, bursts[1].last), (3, 5));
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let times = seconds(Utc::now(), &[0, 5, 10]);
        assert_eq!(detect_bursts(&times, 3, Duration::seconds(10)).len(), 1);
    }

    #[test]
    fn test_zero_threshold_never_fires() {
        let times = seconds(Utc::now(), &[0]);
        assert!(detect_bursts(&times, 0, Duration::seconds(10)).is_empty());
    }

    // ==========================================================================
    // RULE TESTS
    // ==========================================================================

    #[test]
    fn test_high_power_alert() {
        let (_dir, db, engine, session) = engine();
        let now = Utc::now();
        db.record_signal(session, &signal(now - Duration::seconds(60), 2400.0, -35.0, "WIFI"))
            .unwrap();

        let alerts = engine.evaluate_at(now).unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::HighPower);
        assert_eq!(alerts[0].severity, Severity::High);
        assert!(alerts[0].message.contains("-35.0 dBm"), "{}", alerts[0].message);
        assert!(alerts[0].message.contains("2400.0 MHz"), "{}", alerts[0].message);
    }

    #[test]
    fn test_weak_signal_is_quiet() {
        let (_dir, db, engine, session) = engine();
        let now = Utc::now();
        db.record_signal(session, &signal(now - Duration::seconds(60), 2400.0, -50.0, "WIFI"))
            .unwrap();

        assert!(engine.evaluate_at(now).unwrap().is_empty());
    }

    #[test]
    fn test_high_power_outside_window() {
        let (_dir, db, engine, session) = engine();
        let now = Utc::now();
        db.record_signal(session, &signal(now - Duration::seconds(400), 433.0, -20.0, "LORA"))
            .unwrap();

        assert!(engine.evaluate_at(now).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_and_unusual_rules() {
        let (_dir, db, engine, session) = engine();
        let now = Utc::now();
        db.record_signal(session, &signal(now - Duration::seconds(120), 915.0, -60.0, "UNKNOWN"))
            .unwrap();
        db.record_signal(session, &signal(now - Duration::seconds(60), 5800.0, -60.0, "RADAR"))
            .unwrap();

        let alerts = engine.evaluate_at(now).unwrap();
        let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();

        assert_eq!(kinds, vec![AlertKind::UnknownSignal, AlertKind::UnusualFrequency]);
        assert_eq!(alerts[0].message, "UNKNOWN SIGNAL TYPE DETECTED: 915.0 MHz");
        assert_eq!(alerts[1].message, "UNUSUAL FREQUENCY DETECTED: 5800.0 MHz");
        assert_eq!(alerts[1].severity, Severity::Low);
    }

    #[test]
    fn test_burst_rule_over_store() {
        let (_dir, db, engine, session) = engine();
        let now = Utc::now();
        for offset in [0, 2, 4, 6] {
            let at = now - Duration::seconds(60) + Duration::seconds(offset);
            db.record_signal(session, &signal(at, 433.0, -70.0, "LORA")).unwrap();
        }

        let alerts = engine.evaluate_at(now).unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::SignalBurst);
        assert_eq!(alerts[0].message, "SIGNAL BURST DETECTED: 4 signals within 10s");
        assert_eq!(alerts[0].severity, Severity::Medium);
    }

    #[test]
    fn test_order_is_rule_then_recency() {
        let (_dir, db, engine, session) = engine();
        let now = Utc::now();
        db.record_signal(session, &signal(now - Duration::seconds(200), 2400.0, -30.0, "WIFI"))
            .unwrap();
        db.record_signal(session, &signal(now - Duration::seconds(100), 2410.0, -31.0, "WIFI"))
            .unwrap();
        db.record_signal(session, &signal(now - Duration::seconds(50), 1200.0, -60.0, "UNKNOWN"))
            .unwrap();

        let alerts = engine.evaluate_at(now).unwrap();

        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].kind, AlertKind::HighPower);
        assert!(alerts[0].message.contains("2410.0 MHz"), "newest high-power alert first");
        assert!(alerts[1].message.contains("2400.0 MHz"));
        assert_eq!(alerts[2].kind, AlertKind::UnknownSignal);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let (_dir, db, engine, session) = engine();
        let now = Utc::now();
        for (i, dbm) in [-35.0, -20.0, -60.0].into_iter().enumerate() {
            let at = now - Duration::seconds(30 + i as i64);
            db.record_signal(session, &signal(at, 5900.0, dbm, "UNKNOWN")).unwrap();
        }

        let first = engine.evaluate_at(now).unwrap();
        let second = engine.evaluate_at(now).unwrap();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_watch_stops() {
        let (_dir, _db, engine, _session) = engine();
        let stop = AtomicBool::new(false);
        let mut passes = 0;

        engine.watch(std::time::Duration::from_millis(10), &stop, |_| {
            passes += 1;
            if passes == 2 {
                stop.store(true, Ordering::SeqCst);
            }
        });

        assert_eq!(passes, 2);
    }

    #[test]
    fn test_unvalidated_window_is_clamped() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_at(dir.path().join("rf.db")).unwrap());
        let session = db.create_session(60).unwrap();
        db.record_signal(session, &signal(Utc::now() - Duration::seconds(60), 2400.0, -35.0, "WIFI"))
            .unwrap();

        let mut rules = AlertConfig::default();
        rules.high_power.window_secs = i64::MAX;
        rules.signal_burst.time_window_secs = i64::MIN;
        let engine = AlertEngine::new(db, rules);

        let alerts = engine.evaluate().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::HighPower);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::High.to_string(), "HIGH");
    }
}
