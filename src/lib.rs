//! rfwatch - scheduled RF spectrum monitoring
//!
//! rfwatch captures IQ samples on a schedule, measures and classifies what it
//! finds, stores every detection in SQLite, and raises threshold alerts over
//! what was stored.
//!
//! # Overview
//!
//! ```text
//!  Scheduler ──▶ Pipeline ──▶ Repository (write)
//!                   │
//!          SignalSource + Classifier
//!
//!  AlertEngine ──▶ Repository (read) ──▶ alerts
//!  serve / report / CLI ──▶ Repository (read)
//! ```
//!
//! The scheduler and the alert engine never talk to each other. They meet
//! only in the store, which serialises writes per transaction and lets reads
//! proceed against committed rows.
//!
//! # Quick Start
//!
//! ```no_run
//! use rfwatch::{BandClassifier, Config, Database, Pipeline, Scheduler, SimulatedSource};
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let db = Arc::new(Database::from_config(&config.database)?);
//! let pipeline = Pipeline::new(
//!     Box::new(SimulatedSource::new(config.simulator.clone())),
//!     Box::new(BandClassifier::new()),
//!     db.clone(),
//!     config.acquisition.clone(),
//! );
//!
//! let mut scheduler = Scheduler::new(db, pipeline, config.schedule.clone());
//! let summary = scheduler.start(600)?;
//! println!("{} signals in {} scans", summary.signals_detected, summary.total_scans);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Alert rules
//!
//! | Rule              | Window  | Fires when                       | Severity |
//! |-------------------|---------|----------------------------------|----------|
//! | High power        | 5 min   | power above −40 dBm              | HIGH     |
//! | Unknown signal    | 10 min  | classifier answered `UNKNOWN`    | MEDIUM   |
//! | Unusual frequency | 15 min  | above 5000 MHz                   | LOW      |
//! | Signal burst      | sliding | 3 or more detections within 10 s | MEDIUM   |
//!
//! All thresholds and windows come from [`config::AlertConfig`].
//!
//! # Modules
//!
//! - [`scheduler`]: session lifecycle and the periodic task loop
//! - [`pipeline`]: one acquire, analyze, classify, persist tick
//! - [`analyzer`]: spectrum metrics, features, classification
//! - [`source`]: the waveform source seam and the simulator
//! - [`repository`] / [`db`]: the storage contract and its SQLite implementation
//! - [`alerts`]: stateless rule evaluation
//! - [`report`] / [`serve`]: read-only outputs (files, JSON API)

pub mod alerts;
pub mod analyzer;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod repository;
pub mod scheduler;
pub mod schema;
pub mod serve;
pub mod source;

pub use alerts::{Alert, AlertEngine, AlertKind, Severity};
pub use analyzer::{BandClassifier, Classification, Classifier};
pub use config::Config;
pub use db::{Database, DbSummary};
pub use error::{ConfigError, MonitorError, PipelineError, RepoError, SourceError};
pub use model::{DetectedSignal, LogLevel, SpectrumAnalysis, UNKNOWN_SIGNAL_TYPE};
pub use pipeline::{Pipeline, TickOutcome};
pub use repository::{RecordKind, Repository, SessionClose};
pub use scheduler::{MonitorHandle, Scheduler, SchedulerStatus, SessionSummary};
pub use source::{SignalSource, SimulatedSource, SourceCapability, Waveform};
