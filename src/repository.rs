//! The storage contract shared by the scheduler, the pipeline and the alert engine
//!
//! [`crate::db::Database`] is the SQLite implementation. Everything else talks
//! to `dyn Repository` so tests can wrap or replace it.

use crate::db::{
    MonitoringSession, StoredFeatures, StoredPrediction, StoredSignal, StoredSpectrum,
    SystemLogEntry,
};
use crate::error::RepoError;
use crate::model::{DetectedSignal, FeatureRecord, LogLevel, PredictionRecord, SpectrumAnalysis};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Outcome of closing a session. Shutdown paths may close more than once,
/// so the repeated cases are reported, not raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionClose {
    Closed,
    AlreadyClosed,
    NotFound,
}

/// Record kinds that can be read back by recency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Signals,
    Spectra,
    Logs,
    Features,
    Predictions,
}

/// Rows returned by a recency query, most recent first
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum RecentRecords {
    Signals(Vec<StoredSignal>),
    Spectra(Vec<StoredSpectrum>),
    Logs(Vec<SystemLogEntry>),
    Features(Vec<StoredFeatures>),
    Predictions(Vec<StoredPrediction>),
}

impl RecentRecords {
    pub fn len(&self) -> usize {
        match self {
            RecentRecords::Signals(v) => v.len(),
            RecentRecords::Spectra(v) => v.len(),
            RecentRecords::Logs(v) => v.len(),
            RecentRecords::Features(v) => v.len(),
            RecentRecords::Predictions(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_signals(self) -> Vec<StoredSignal> {
        match self {
            RecentRecords::Signals(v) => v,
            _ => Vec::new(),
        }
    }
}

pub trait Repository: Send + Sync {
    /// Open a session starting now with zeroed counters
    fn create_session(&self, duration_secs: u64) -> Result<i32, RepoError>;

    /// Append a signal and bump the session's `signals_detected` in one transaction
    fn record_signal(&self, session_id: i32, signal: &DetectedSignal) -> Result<i32, RepoError>;

    fn record_spectrum(&self, record: &SpectrumAnalysis) -> Result<i32, RepoError>;

    fn record_features(&self, record: &FeatureRecord) -> Result<i32, RepoError>;

    fn record_prediction(&self, record: &PredictionRecord) -> Result<i32, RepoError>;

    /// Set the end time and final scan count, once
    fn end_session(&self, session_id: i32, total_scans: u64) -> Result<SessionClose, RepoError>;

    /// Rows of `kind` strictly newer than `since`, most recent first
    fn query_since(&self, kind: RecordKind, since: DateTime<Utc>)
        -> Result<RecentRecords, RepoError>;

    /// Append a system log row. Never fails the caller.
    fn log(&self, module: &str, level: LogLevel, message: &str, payload: Option<&serde_json::Value>);

    fn get_session(&self, session_id: i32) -> Result<Option<MonitoringSession>, RepoError>;

    fn query_recent(&self, kind: RecordKind, window: Duration) -> Result<RecentRecords, RepoError> {
        self.query_since(kind, Utc::now() - window)
    }

    fn signals_since(&self, since: DateTime<Utc>) -> Result<Vec<StoredSignal>, RepoError> {
        Ok(self.query_since(RecordKind::Signals, since)?.into_signals())
    }
}
