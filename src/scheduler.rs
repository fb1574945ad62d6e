//! Session scheduler
//!
//! Owns one bounded monitoring session. Four tasks run at their own periods
//! inside a single tick loop:
//!
//! | Task     | Default period | Work per run                               |
//! |----------|----------------|--------------------------------------------|
//! | quick    | 60 s           | one detection per candidate frequency      |
//! | deep     | 180 s          | `deep_segments` steps of the deep sweep    |
//! | spectral | 300 s          | one spectrum record                        |
//! | report   | 600 s          | one `system_logs` row summarising activity |
//!
//! A task that falls behind runs once when next checked, never in a burst.
//! Stop requests are seen at the next tick boundary.
//!
//! # Status
//!
//! ```text
//! Idle ──start──▶ Running ──duration elapsed──▶ Completed
//!                    │
//!                    └──────stop()──────────────▶ Cancelled
//! ```
//!
//! Either terminal state closes the session once and writes a summary.

use crate::config::ScheduleConfig;
use crate::error::{MonitorError, PipelineError, RepoError};
use crate::model::LogLevel;
use crate::pipeline::{Pipeline, TickOutcome};
use crate::repository::{RecordKind, Repository, SessionClose};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl SchedulerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SchedulerStatus::Completed | SchedulerStatus::Cancelled)
    }
}

impl fmt::Display for SchedulerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerStatus::Idle => "idle",
            SchedulerStatus::Running => "running",
            SchedulerStatus::Completed => "completed",
            SchedulerStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Period plus last run time for one task
#[derive(Debug)]
struct Ticker {
    period: Duration,
    last_run: Option<Instant>,
}

impl Ticker {
    fn new(period: Duration, run_at_start: bool, start: Instant) -> Self {
        Self {
            period,
            last_run: if run_at_start { None } else { Some(start) },
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.duration_since(last) >= self.period,
        }
    }

    // Restarting from `now` instead of `last + period` drops missed periods
    fn mark(&mut self, now: Instant) {
        self.last_run = Some(now);
    }
}

struct Shared {
    status: Mutex<SchedulerStatus>,
    stop: AtomicBool,
}

impl Shared {
    fn status(&self) -> SchedulerStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: SchedulerStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }
}

/// Control surface for a scheduler running on another thread
#[derive(Clone)]
pub struct MonitorHandle {
    shared: Arc<Shared>,
}

impl MonitorHandle {
    /// Ask the run to stop at its next tick. Safe to call any number of times.
    /// Ignored unless a session is running.
    pub fn stop(&self) {
        let status = self.shared.status.lock().unwrap_or_else(|e| e.into_inner());
        let current = *status;
        if current != SchedulerStatus::Running {
            debug!(status = %current, "stop ignored");
            return;
        }
        if !self.shared.stop.swap(true, Ordering::SeqCst) {
            debug!("stop requested");
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        self.shared.status()
    }
}

/// Counts written at the end of every run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: i32,
    pub status: SchedulerStatus,
    pub total_scans: u64,
    pub signals_detected: u64,
    pub spectrum_records: u64,
    pub task_failures: u64,
    pub elapsed_secs: f64,
}

#[derive(Debug, Default)]
struct RunStats {
    total_scans: u64,
    signals_recorded: u64,
    spectrum_records: u64,
    task_failures: u64,
}

pub struct Scheduler {
    repo: Arc<dyn Repository>,
    pipeline: Pipeline,
    schedule: ScheduleConfig,
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(repo: Arc<dyn Repository>, pipeline: Pipeline, schedule: ScheduleConfig) -> Self {
        Self {
            repo,
            pipeline,
            schedule,
            shared: Arc::new(Shared {
                status: Mutex::new(SchedulerStatus::Idle),
                stop: AtomicBool::new(false),
            }),
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        self.shared.status()
    }

    pub fn stop(&self) {
        self.handle().stop();
    }

    /// Run a session for `duration_secs` wall-clock seconds. Blocks.
    pub fn start(&mut self, duration_secs: u64) -> Result<SessionSummary, MonitorError> {
        self.run_for(Duration::from_secs(duration_secs))
    }

    pub fn run_for(&mut self, duration: Duration) -> Result<SessionSummary, MonitorError> {
        {
            let mut status = self.shared.status.lock().unwrap_or_else(|e| e.into_inner());
            if *status != SchedulerStatus::Idle {
                return Err(MonitorError::InvalidState(*status));
            }
            self.shared.stop.store(false, Ordering::SeqCst);
            *status = SchedulerStatus::Running;
        }

        let session_id = match self.repo.create_session(duration.as_secs()) {
            Ok(id) => id,
            Err(e) => {
                // No session was opened, so there is nothing to close
                self.shared.set_status(SchedulerStatus::Idle);
                return Err(MonitorError::SessionStart(e));
            }
        };

        info!(
            session_id,
            duration_secs = duration.as_secs(),
            source = self.pipeline.source_name(),
            "monitoring started"
        );
        self.repo.log(
            "scheduler",
            LogLevel::Info,
            &format!("monitoring session {} started for {}s", session_id, duration.as_secs()),
            None,
        );

        let started = Instant::now();
        let mut stats = RunStats::default();
        let terminal = self.tick_loop(session_id, started, duration, &mut stats);

        self.finish(session_id, terminal, started, stats)
    }

    fn tick_loop(
        &mut self,
        session_id: i32,
        started: Instant,
        duration: Duration,
        stats: &mut RunStats,
    ) -> SchedulerStatus {
        let at_start = self.schedule.run_scans_at_start;
        let mut quick = Ticker::new(Duration::from_secs(self.schedule.quick_secs), at_start, started);
        let mut deep = Ticker::new(Duration::from_secs(self.schedule.deep_secs), at_start, started);
        let mut spectral = Ticker::new(Duration::from_secs(self.schedule.spectral_secs), false, started);
        let mut report = Ticker::new(Duration::from_secs(self.schedule.report_secs), false, started);
        let tick = self.schedule.tick();

        loop {
            if self.shared.stop.load(Ordering::SeqCst) {
                return SchedulerStatus::Cancelled;
            }
            let now = Instant::now();
            if now.duration_since(started) >= duration {
                return SchedulerStatus::Completed;
            }

            if quick.is_due(now) {
                quick.mark(now);
                self.quick_pass(session_id, stats);
            }
            if deep.is_due(now) {
                deep.mark(now);
                self.deep_pass(session_id, stats);
            }
            if spectral.is_due(now) {
                spectral.mark(now);
                stats.total_scans += 1;
                match self.pipeline.spectral_tick() {
                    Ok(_) => stats.spectrum_records += 1,
                    Err(e) => self.task_failed("spectral", &e, stats),
                }
            }
            if report.is_due(now) {
                report.mark(now);
                if let Err(e) = self.report(session_id, stats) {
                    self.task_failed("report", &e, stats);
                }
            }

            let remaining = duration.saturating_sub(started.elapsed());
            if !remaining.is_zero() {
                thread::sleep(tick.min(remaining));
            }
        }
    }

    fn quick_pass(&mut self, session_id: i32, stats: &mut RunStats) {
        let candidates = self.pipeline.config().quick_frequencies_hz.clone();
        debug!(session_id, candidates = candidates.len(), "quick pass");
        for freq in candidates {
            stats.total_scans += 1;
            let outcome = self.pipeline.detect(session_id, freq);
            self.tally("quick", outcome, stats);
        }
    }

    fn deep_pass(&mut self, session_id: i32, stats: &mut RunStats) {
        let segments = self.pipeline.config().deep_segments;
        debug!(session_id, segments, "deep pass");
        for _ in 0..segments {
            stats.total_scans += 1;
            let outcome = self.pipeline.deep_tick(session_id);
            self.tally("deep", outcome, stats);
        }
    }

    fn tally(&self, task: &str, outcome: Result<TickOutcome, PipelineError>, stats: &mut RunStats) {
        match outcome {
            Ok(TickOutcome::Signal { signal, .. }) => {
                stats.signals_recorded += 1;
                info!(
                    task,
                    frequency_mhz = signal.frequency_mhz(),
                    power_dbm = signal.power_dbm,
                    signal_type = %signal.signal_type,
                    "signal detected"
                );
            }
            Ok(_) => {}
            Err(e) => self.task_failed(task, &e, stats),
        }
    }

    // A failed task is counted and logged; the run carries on
    fn task_failed(&self, task: &str, error: &dyn fmt::Display, stats: &mut RunStats) {
        stats.task_failures += 1;
        warn!(task, error = %error, "task failed");
        self.repo.log(
            "scheduler",
            LogLevel::Warning,
            &format!("{} task failed: {}", task, error),
            None,
        );
    }

    fn report(&self, session_id: i32, stats: &RunStats) -> Result<(), RepoError> {
        let window = chrono::Duration::seconds(self.schedule.report_secs as i64);
        let signals: Vec<_> = self
            .repo
            .query_recent(RecordKind::Signals, window)?
            .into_signals()
            .into_iter()
            .filter(|s| s.session_id == session_id)
            .collect();

        let latest: Vec<serde_json::Value> = signals
            .iter()
            .take(5)
            .map(|s| {
                serde_json::json!({
                    "timestamp": s.timestamp,
                    "frequency_mhz": s.frequency_mhz,
                    "power_dbm": s.power_dbm,
                    "signal_type": s.signal_type,
                })
            })
            .collect();

        let payload = serde_json::json!({
            "session_id": session_id,
            "window_secs": self.schedule.report_secs,
            "signals_in_window": signals.len(),
            "total_scans": stats.total_scans,
            "latest": latest,
        });

        info!(session_id, signals_in_window = signals.len(), "periodic report");
        self.repo.log(
            "monitor",
            LogLevel::Info,
            &format!("{} signals in the last {}s", signals.len(), self.schedule.report_secs),
            Some(&payload),
        );
        Ok(())
    }

    fn finish(
        &mut self,
        session_id: i32,
        terminal: SchedulerStatus,
        started: Instant,
        stats: RunStats,
    ) -> Result<SessionSummary, MonitorError> {
        let elapsed_secs = started.elapsed().as_secs_f64();
        let closed = self.repo.end_session(session_id, stats.total_scans);

        let reason = match terminal {
            SchedulerStatus::Cancelled => "stopped by request",
            _ => "duration elapsed",
        };
        info!(session_id, status = %terminal, elapsed_secs, "monitoring {}", reason);
        self.repo.log(
            "scheduler",
            LogLevel::Info,
            &format!("monitoring session {} {}: {}", session_id, terminal, reason),
            None,
        );

        // Prefer the committed counter; fall back to what this run saw
        let signals_detected = match self.repo.get_session(session_id) {
            Ok(Some(session)) => session.signals_detected.max(0) as u64,
            _ => stats.signals_recorded,
        };

        let summary = SessionSummary {
            session_id,
            status: terminal,
            total_scans: stats.total_scans,
            signals_detected,
            spectrum_records: stats.spectrum_records,
            task_failures: stats.task_failures,
            elapsed_secs,
        };

        let payload = serde_json::to_value(&summary).ok();
        self.repo.log(
            "scheduler",
            LogLevel::Info,
            &format!(
                "session summary: {} scans, {} signals, {} spectra, {} failures",
                summary.total_scans,
                summary.signals_detected,
                summary.spectrum_records,
                summary.task_failures
            ),
            payload.as_ref(),
        );
        self.shared.set_status(terminal);

        match closed {
            Ok(SessionClose::Closed) => Ok(summary),
            Ok(other) => {
                warn!(session_id, ?other, "session was not open at shutdown");
                Ok(summary)
            }
            Err(source) => Err(MonitorError::SessionEnd { session_id, source }),
        }
    }
}
