//! SQLite database with Diesel ORM
//!
//! Stores monitoring sessions, detected signals, spectrum analyses, feature
//! vectors, classifier predictions and system logs. Tables are created on open.
//!
//! Column names and units (MHz, dBm) are read by external dashboards and
//! analytics scripts, so they must not change.

use crate::error::RepoError;
use crate::model::{
    format_timestamp, now_timestamp, DetectedSignal, FeatureRecord, LogLevel, PredictionRecord,
    SpectrumAnalysis,
};
use crate::repository::{RecentRecords, RecordKind, Repository, SessionClose};
use crate::schema::*;
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sql_types::{BigInt, Double, Nullable, Text};
use diesel::sqlite::SqliteConnection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const DEFAULT_POOL_SIZE: u32 = 5;
const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable monitoring session
#[derive(Insertable)]
#[diesel(table_name = monitoring_sessions)]
pub struct NewSession<'a> {
    pub session_start: &'a str,
    pub session_end: Option<&'a str>,
    pub duration_seconds: i64,
    pub total_scans: i64,
    pub signals_detected: i64,
    pub created_at: &'a str,
}

/// Queryable monitoring session
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, serde::Serialize)]
#[diesel(table_name = monitoring_sessions)]
pub struct MonitoringSession {
    pub id: i32,
    pub session_start: String,
    pub session_end: Option<String>,
    pub duration_seconds: i64,
    pub total_scans: i64,
    pub signals_detected: i64,
    pub created_at: String,
}

impl MonitoringSession {
    pub fn is_open(&self) -> bool {
        self.session_end.is_none()
    }
}

/// Insertable detected signal
#[derive(Insertable)]
#[diesel(table_name = detected_signals)]
pub struct NewDetectedSignal<'a> {
    pub session_id: i32,
    pub timestamp: &'a str,
    pub frequency_mhz: f64,
    pub power_dbm: f64,
    pub signal_type: &'a str,
    pub confidence: f64,
    pub bandwidth_mhz: f64,
    pub modulation_type: Option<&'a str>,
    pub created_at: &'a str,
}

/// Queryable detected signal
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, serde::Serialize)]
#[diesel(table_name = detected_signals)]
pub struct StoredSignal {
    pub id: i32,
    pub session_id: i32,
    pub timestamp: String,
    pub frequency_mhz: f64,
    pub power_dbm: f64,
    pub signal_type: String,
    pub confidence: f64,
    pub bandwidth_mhz: f64,
    pub modulation_type: Option<String>,
    pub created_at: String,
}

/// Insertable spectrum analysis
#[derive(Insertable)]
#[diesel(table_name = spectrum_analysis)]
pub struct NewSpectrumRecord<'a> {
    pub timestamp: &'a str,
    pub center_frequency_mhz: f64,
    pub bandwidth_mhz: f64,
    pub peak_power_dbm: f64,
    pub mean_power_dbm: f64,
    pub peak_frequency_bin: i32,
    pub total_bands: i32,
    pub noise_floor_dbm: f64,
    pub created_at: &'a str,
}

/// Queryable spectrum analysis
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, serde::Serialize)]
#[diesel(table_name = spectrum_analysis)]
pub struct StoredSpectrum {
    pub id: i32,
    pub timestamp: String,
    pub center_frequency_mhz: f64,
    pub bandwidth_mhz: f64,
    pub peak_power_dbm: f64,
    pub mean_power_dbm: f64,
    pub peak_frequency_bin: i32,
    pub total_bands: i32,
    pub noise_floor_dbm: f64,
    pub created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = ml_features)]
pub struct NewFeatures<'a> {
    pub timestamp: &'a str,
    pub feature_vector: &'a str,
    pub feature_count: i32,
    pub signal_class: &'a str,
    pub model_used: &'a str,
    pub confidence: f64,
    pub created_at: &'a str,
}

/// Queryable feature vector; `feature_vector` is a JSON array
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, serde::Serialize)]
#[diesel(table_name = ml_features)]
pub struct StoredFeatures {
    pub id: i32,
    pub timestamp: String,
    pub feature_vector: String,
    pub feature_count: i32,
    pub signal_class: String,
    pub model_used: String,
    pub confidence: f64,
    pub created_at: String,
}

impl StoredFeatures {
    pub fn values(&self) -> Vec<f64> {
        serde_json::from_str(&self.feature_vector).unwrap_or_default()
    }
}

#[derive(Insertable)]
#[diesel(table_name = cnn_predictions)]
pub struct NewPrediction<'a> {
    pub timestamp: &'a str,
    pub modulation_type: &'a str,
    pub confidence: f64,
    pub input_shape: &'a str,
    pub prediction_time_ms: f64,
    pub created_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, serde::Serialize)]
#[diesel(table_name = cnn_predictions)]
pub struct StoredPrediction {
    pub id: i32,
    pub timestamp: String,
    pub modulation_type: String,
    pub confidence: f64,
    pub input_shape: String,
    pub prediction_time_ms: f64,
    pub created_at: String,
}

/// Insertable system log entry
#[derive(Insertable)]
#[diesel(table_name = system_logs)]
pub struct NewSystemLog<'a> {
    pub timestamp: &'a str,
    pub module_name: &'a str,
    pub log_level: &'a str,
    pub message: &'a str,
    pub data: Option<&'a str>,
    pub created_at: &'a str,
}

/// Queryable system log entry
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, serde::Serialize)]
#[diesel(table_name = system_logs)]
pub struct SystemLogEntry {
    pub id: i32,
    pub timestamp: String,
    pub module_name: String,
    pub log_level: String,
    pub message: String,
    pub data: Option<String>,
    pub created_at: String,
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

pub type Result<T> = std::result::Result<T, RepoError>;

/// Per-connection pragmas. WAL lets dashboard reads proceed while the
/// scheduler writes; readers only ever see committed transactions.
#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout_ms: u32,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Database connection wrapper with connection pool
pub struct Database {
    pool: DbPool,
    path: PathBuf,
    log_failures: AtomicU64,
}

/// Helper for raw SQL aggregate queries
#[derive(QueryableByName)]
struct PowerStats {
    #[diesel(sql_type = Nullable<Double>)]
    avg: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    max: Option<f64>,
}

/// Per-signal-type statistics for reports
#[derive(QueryableByName, Debug, Clone, PartialEq, serde::Serialize)]
pub struct SignalTypeStats {
    #[diesel(sql_type = Text)]
    pub signal_type: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
    #[diesel(sql_type = Nullable<Double>)]
    pub avg_power_dbm: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub avg_frequency_mhz: Option<f64>,
}

/// Signal totals over a period
#[derive(QueryableByName, Debug, Clone, PartialEq, serde::Serialize)]
pub struct ActivityStats {
    #[diesel(sql_type = BigInt)]
    pub total_signals: i64,
    #[diesel(sql_type = Nullable<Double>)]
    pub avg_power_dbm: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub min_power_dbm: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub max_power_dbm: Option<f64>,
    #[diesel(sql_type = BigInt)]
    pub unique_signal_types: i64,
}

#[derive(QueryableByName, Debug, Clone, PartialEq, serde::Serialize)]
pub struct HourlyActivity {
    /// "HH:00", UTC
    #[diesel(sql_type = Text)]
    pub hour: String,
    #[diesel(sql_type = BigInt)]
    pub signal_count: i64,
}

impl Database {
    /// Open database at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, DEFAULT_POOL_SIZE, DEFAULT_BUSY_TIMEOUT_MS)
    }

    /// Open using the `[database]` section of the configuration
    pub fn from_config(config: &crate::config::DatabaseConfig) -> Result<Self> {
        Self::open_with(&config.path, config.pool_size, config.busy_timeout_ms)
    }

    fn open_with<P: AsRef<Path>>(path: P, pool_size: u32, busy_timeout_ms: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let path_str = path.to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_customizer(Box::new(ConnectionOptions { busy_timeout_ms }))
            .build(manager)
            .map_err(|e| RepoError::Connection(e.to_string()))?;

        let db = Self {
            pool,
            path,
            log_failures: AtomicU64::new(0),
        };
        db.init_schema()?;
        tracing::debug!(path = %db.path.display(), "database opened");
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of `log()` writes that failed since open
    pub fn log_failures(&self) -> u64 {
        self.log_failures.load(Ordering::Relaxed)
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| RepoError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        conn.batch_execute(r#"
            CREATE TABLE IF NOT EXISTS monitoring_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                session_start TEXT NOT NULL,
                session_end TEXT,
                duration_seconds INTEGER NOT NULL,
                total_scans INTEGER NOT NULL DEFAULT 0,
                signals_detected INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS detected_signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                session_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                frequency_mhz REAL NOT NULL,
                power_dbm REAL NOT NULL,
                signal_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                bandwidth_mhz REAL NOT NULL,
                modulation_type TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES monitoring_sessions(id)
            );

            CREATE TABLE IF NOT EXISTS spectrum_analysis (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                timestamp TEXT NOT NULL,
                center_frequency_mhz REAL NOT NULL,
                bandwidth_mhz REAL NOT NULL,
                peak_power_dbm REAL NOT NULL,
                mean_power_dbm REAL NOT NULL,
                peak_frequency_bin INTEGER NOT NULL,
                total_bands INTEGER NOT NULL,
                noise_floor_dbm REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ml_features (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                timestamp TEXT NOT NULL,
                feature_vector TEXT NOT NULL,
                feature_count INTEGER NOT NULL,
                signal_class TEXT NOT NULL,
                model_used TEXT NOT NULL,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cnn_predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                timestamp TEXT NOT NULL,
                modulation_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                input_shape TEXT NOT NULL,
                prediction_time_ms REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS system_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                timestamp TEXT NOT NULL,
                module_name TEXT NOT NULL,
                log_level TEXT NOT NULL,
                message TEXT NOT NULL,
                data TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_signals_timestamp ON detected_signals(timestamp);
            CREATE INDEX IF NOT EXISTS idx_signals_session ON detected_signals(session_id);
            CREATE INDEX IF NOT EXISTS idx_spectrum_timestamp ON spectrum_analysis(timestamp);
            CREATE INDEX IF NOT EXISTS idx_features_timestamp ON ml_features(timestamp);
            CREATE INDEX IF NOT EXISTS idx_predictions_timestamp ON cnn_predictions(timestamp);
            CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON system_logs(timestamp);
        "#)?;

        Ok(())
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Most recent sessions first
    pub fn list_sessions(&self, limit: i64) -> Result<Vec<MonitoringSession>> {
        let mut conn = self.get_conn()?;
        let sessions = monitoring_sessions::table
            .order(monitoring_sessions::id.desc())
            .limit(limit)
            .load::<MonitoringSession>(&mut conn)?;
        Ok(sessions)
    }

    /// Count signal rows for a session, independent of its counter
    pub fn count_signals(&self, session_id: i32) -> Result<i64> {
        let mut conn = self.get_conn()?;
        let count = detected_signals::table
            .filter(detected_signals::session_id.eq(session_id))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    // ========================================================================
    // Signals
    // ========================================================================

    /// Latest signals regardless of age
    pub fn recent_signals(&self, limit: i64) -> Result<Vec<StoredSignal>> {
        let mut conn = self.get_conn()?;
        let signals = detected_signals::table
            .order((detected_signals::timestamp.desc(), detected_signals::id.desc()))
            .limit(limit)
            .load::<StoredSignal>(&mut conn)?;
        Ok(signals)
    }

    /// Latest spectrum analyses regardless of age
    pub fn recent_spectra(&self, limit: i64) -> Result<Vec<StoredSpectrum>> {
        let mut conn = self.get_conn()?;
        let spectra = spectrum_analysis::table
            .order((spectrum_analysis::timestamp.desc(), spectrum_analysis::id.desc()))
            .limit(limit)
            .load::<StoredSpectrum>(&mut conn)?;
        Ok(spectra)
    }

    /// Count, mean power and mean frequency per signal type since `since`
    pub fn signal_breakdown(&self, since: DateTime<Utc>) -> Result<Vec<SignalTypeStats>> {
        let mut conn = self.get_conn()?;
        let stats = diesel::sql_query(
            "SELECT signal_type, COUNT(*) AS count, AVG(power_dbm) AS avg_power_dbm, \
             AVG(frequency_mhz) AS avg_frequency_mhz \
             FROM detected_signals WHERE timestamp > ? \
             GROUP BY signal_type ORDER BY count DESC, signal_type ASC",
        )
        .bind::<Text, _>(format_timestamp(since))
        .load::<SignalTypeStats>(&mut conn)?;
        Ok(stats)
    }

    /// Totals and power range of signals since `since`
    pub fn activity_stats(&self, since: DateTime<Utc>) -> Result<ActivityStats> {
        let mut conn = self.get_conn()?;
        let stats = diesel::sql_query(
            "SELECT COUNT(*) AS total_signals, AVG(power_dbm) AS avg_power_dbm, \
             MIN(power_dbm) AS min_power_dbm, MAX(power_dbm) AS max_power_dbm, \
             COUNT(DISTINCT signal_type) AS unique_signal_types \
             FROM detected_signals WHERE timestamp > ?",
        )
        .bind::<Text, _>(format_timestamp(since))
        .get_result::<ActivityStats>(&mut conn)?;
        Ok(stats)
    }

    /// Signal count per UTC hour of day since `since`, in hour order
    pub fn hourly_activity(&self, since: DateTime<Utc>) -> Result<Vec<HourlyActivity>> {
        let mut conn = self.get_conn()?;
        // Timestamps are fixed-width RFC 3339, so the hour is characters 12-13
        let hours = diesel::sql_query(
            "SELECT substr(timestamp, 12, 2) || ':00' AS hour, COUNT(*) AS signal_count \
             FROM detected_signals WHERE timestamp > ? \
             GROUP BY hour ORDER BY hour",
        )
        .bind::<Text, _>(format_timestamp(since))
        .load::<HourlyActivity>(&mut conn)?;
        Ok(hours)
    }

    /// Copy the live database to `dest` with `VACUUM INTO`
    pub fn backup_to<P: AsRef<Path>>(&self, dest: P) -> Result<()> {
        let mut conn = self.get_conn()?;
        let dest = dest.as_ref().to_string_lossy().replace('\'', "''");
        conn.batch_execute(&format!("VACUUM INTO '{}'", dest))?;
        tracing::info!(dest = %dest, "database backed up");
        Ok(())
    }

    /// Get summary statistics
    pub fn get_summary(&self) -> Result<DbSummary> {
        let mut conn = self.get_conn()?;

        let sessions: i64 = monitoring_sessions::table.count().get_result(&mut conn)?;
        let open_sessions: i64 = monitoring_sessions::table
            .filter(monitoring_sessions::session_end.is_null())
            .count()
            .get_result(&mut conn)?;
        let signals: i64 = detected_signals::table.count().get_result(&mut conn)?;
        let unknown_signals: i64 = detected_signals::table
            .filter(detected_signals::signal_type.eq(crate::model::UNKNOWN_SIGNAL_TYPE))
            .count()
            .get_result(&mut conn)?;
        let spectra: i64 = spectrum_analysis::table.count().get_result(&mut conn)?;
        let log_entries: i64 = system_logs::table.count().get_result(&mut conn)?;

        // Raw SQL since Diesel's avg returns Numeric
        let power = diesel::sql_query(
            "SELECT AVG(power_dbm) AS avg, MAX(power_dbm) AS max FROM detected_signals",
        )
        .get_result::<PowerStats>(&mut conn)?;

        Ok(DbSummary {
            sessions,
            open_sessions,
            signals,
            unknown_signals,
            spectra,
            log_entries,
            avg_power_dbm: power.avg,
            max_power_dbm: power.max,
        })
    }

    fn try_log(
        &self,
        module: &str,
        level: LogLevel,
        message: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<()> {
        let mut conn = self.get_conn()?;
        let now = now_timestamp();
        let data = payload.map(serde_json::to_string).transpose()?;

        let entry = NewSystemLog {
            timestamp: &now,
            module_name: module,
            log_level: level.as_str(),
            message,
            data: data.as_deref(),
            created_at: &now,
        };

        diesel::insert_into(system_logs::table)
            .values(&entry)
            .execute(&mut conn)?;
        Ok(())
    }
}

fn last_insert_id(conn: &mut SqliteConnection) -> QueryResult<i32> {
    diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
        .first(conn)
}

impl Repository for Database {
    fn create_session(&self, duration_secs: u64) -> Result<i32> {
        let mut conn = self.get_conn()?;
        let now = now_timestamp();

        let new_session = NewSession {
            session_start: &now,
            session_end: None,
            duration_seconds: duration_secs as i64,
            total_scans: 0,
            signals_detected: 0,
            created_at: &now,
        };

        let id = conn.immediate_transaction::<_, RepoError, _>(|conn| {
            diesel::insert_into(monitoring_sessions::table)
                .values(&new_session)
                .execute(conn)?;
            Ok(last_insert_id(conn)?)
        })?;

        tracing::info!(session_id = id, duration_secs, "monitoring session created");
        Ok(id)
    }

    fn record_signal(&self, session_id: i32, signal: &DetectedSignal) -> Result<i32> {
        let mut conn = self.get_conn()?;
        let now = now_timestamp();
        let timestamp = format_timestamp(signal.timestamp);

        let row = NewDetectedSignal {
            session_id,
            timestamp: &timestamp,
            frequency_mhz: signal.frequency_mhz(),
            power_dbm: signal.power_dbm,
            signal_type: &signal.signal_type,
            confidence: signal.confidence,
            bandwidth_mhz: signal.bandwidth_mhz(),
            modulation_type: signal.modulation.as_deref(),
            created_at: &now,
        };

        // Insert and counter bump commit together or not at all
        conn.immediate_transaction::<_, RepoError, _>(|conn| {
            let exists = monitoring_sessions::table
                .find(session_id)
                .select(monitoring_sessions::id)
                .first::<i32>(conn)
                .optional()?;
            if exists.is_none() {
                return Err(RepoError::InvalidReference(session_id));
            }

            diesel::insert_into(detected_signals::table)
                .values(&row)
                .execute(conn)?;
            let id = last_insert_id(conn)?;

            diesel::update(monitoring_sessions::table.find(session_id))
                .set(monitoring_sessions::signals_detected.eq(monitoring_sessions::signals_detected + 1i64))
                .execute(conn)?;

            Ok(id)
        })
    }

    fn record_spectrum(&self, record: &SpectrumAnalysis) -> Result<i32> {
        let mut conn = self.get_conn()?;
        let now = now_timestamp();
        let timestamp = format_timestamp(record.timestamp);

        let row = NewSpectrumRecord {
            timestamp: &timestamp,
            center_frequency_mhz: record.center_frequency_hz / 1e6,
            bandwidth_mhz: record.bandwidth_hz / 1e6,
            peak_power_dbm: record.peak_power_dbm,
            mean_power_dbm: record.mean_power_dbm,
            peak_frequency_bin: record.peak_frequency_bin as i32,
            total_bands: record.total_bands as i32,
            noise_floor_dbm: record.noise_floor_dbm,
            created_at: &now,
        };

        conn.immediate_transaction::<_, RepoError, _>(|conn| {
            diesel::insert_into(spectrum_analysis::table)
                .values(&row)
                .execute(conn)?;
            Ok(last_insert_id(conn)?)
        })
    }

    fn record_features(&self, record: &FeatureRecord) -> Result<i32> {
        let mut conn = self.get_conn()?;
        let now = now_timestamp();
        let timestamp = format_timestamp(record.timestamp);
        let vector = serde_json::to_string(&record.features)?;

        let row = NewFeatures {
            timestamp: &timestamp,
            feature_vector: &vector,
            feature_count: record.features.len() as i32,
            signal_class: &record.signal_class,
            model_used: &record.model_used,
            confidence: record.confidence,
            created_at: &now,
        };

        conn.immediate_transaction::<_, RepoError, _>(|conn| {
            diesel::insert_into(ml_features::table)
                .values(&row)
                .execute(conn)?;
            Ok(last_insert_id(conn)?)
        })
    }

    fn record_prediction(&self, record: &PredictionRecord) -> Result<i32> {
        let mut conn = self.get_conn()?;
        let now = now_timestamp();
        let timestamp = format_timestamp(record.timestamp);

        let row = NewPrediction {
            timestamp: &timestamp,
            modulation_type: &record.modulation,
            confidence: record.confidence,
            input_shape: &record.input_shape,
            prediction_time_ms: record.prediction_time_ms,
            created_at: &now,
        };

        conn.immediate_transaction::<_, RepoError, _>(|conn| {
            diesel::insert_into(cnn_predictions::table)
                .values(&row)
                .execute(conn)?;
            Ok(last_insert_id(conn)?)
        })
    }

    fn end_session(&self, session_id: i32, total_scans: u64) -> Result<SessionClose> {
        let mut conn = self.get_conn()?;
        let now = now_timestamp();

        let outcome = conn.immediate_transaction::<_, RepoError, _>(|conn| {
            let ended = monitoring_sessions::table
                .find(session_id)
                .select(monitoring_sessions::session_end)
                .first::<Option<String>>(conn)
                .optional()?;

            match ended {
                None => Ok(SessionClose::NotFound),
                Some(Some(_)) => Ok(SessionClose::AlreadyClosed),
                Some(None) => {
                    diesel::update(monitoring_sessions::table.find(session_id))
                        .set((
                            monitoring_sessions::session_end.eq(Some(now.as_str())),
                            monitoring_sessions::total_scans.eq(total_scans as i64),
                        ))
                        .execute(conn)?;
                    Ok(SessionClose::Closed)
                }
            }
        })?;

        match outcome {
            SessionClose::Closed => {
                tracing::info!(session_id, total_scans, "monitoring session closed")
            }
            other => tracing::debug!(session_id, ?other, "end_session was a no-op"),
        }
        Ok(outcome)
    }

    fn query_since(&self, kind: RecordKind, since: DateTime<Utc>) -> Result<RecentRecords> {
        let mut conn = self.get_conn()?;
        let since = format_timestamp(since);

        let records = match kind {
            RecordKind::Signals => RecentRecords::Signals(
                detected_signals::table
                    .filter(detected_signals::timestamp.gt(since.as_str()))
                    .order((detected_signals::timestamp.desc(), detected_signals::id.desc()))
                    .load::<StoredSignal>(&mut conn)?,
            ),
            RecordKind::Spectra => RecentRecords::Spectra(
                spectrum_analysis::table
                    .filter(spectrum_analysis::timestamp.gt(since.as_str()))
                    .order((spectrum_analysis::timestamp.desc(), spectrum_analysis::id.desc()))
                    .load::<StoredSpectrum>(&mut conn)?,
            ),
            RecordKind::Logs => RecentRecords::Logs(
                system_logs::table
                    .filter(system_logs::timestamp.gt(since.as_str()))
                    .order((system_logs::timestamp.desc(), system_logs::id.desc()))
                    .load::<SystemLogEntry>(&mut conn)?,
            ),
            RecordKind::Features => RecentRecords::Features(
                ml_features::table
                    .filter(ml_features::timestamp.gt(since.as_str()))
                    .order((ml_features::timestamp.desc(), ml_features::id.desc()))
                    .load::<StoredFeatures>(&mut conn)?,
            ),
            RecordKind::Predictions => RecentRecords::Predictions(
                cnn_predictions::table
                    .filter(cnn_predictions::timestamp.gt(since.as_str()))
                    .order((cnn_predictions::timestamp.desc(), cnn_predictions::id.desc()))
                    .load::<StoredPrediction>(&mut conn)?,
            ),
        };

        Ok(records)
    }

    fn log(&self, module: &str, level: LogLevel, message: &str, payload: Option<&serde_json::Value>) {
        if let Err(e) = self.try_log(module, level, message, payload) {
            let failures = self.log_failures.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                module,
                level = level.as_str(),
                failures,
                error = %e,
                "could not persist log entry: {}",
                message
            );
        }
    }

    fn get_session(&self, session_id: i32) -> Result<Option<MonitoringSession>> {
        let mut conn = self.get_conn()?;
        let session = monitoring_sessions::table
            .find(session_id)
            .first::<MonitoringSession>(&mut conn)
            .optional()?;
        Ok(session)
    }
}

// ============================================================================
// Additional Types
// ============================================================================

/// Summary statistics from the database
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DbSummary {
    pub sessions: i64,
    pub open_sessions: i64,
    pub signals: i64,
    pub unknown_signals: i64,
    pub spectra: i64,
    pub log_entries: i64,
    pub avg_power_dbm: Option<f64>,
    pub max_power_dbm: Option<f64>,
}
