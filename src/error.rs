//! Error types shared across the monitoring core

use crate::scheduler::SchedulerStatus;
use thiserror::Error;

/// Errors raised by the signal repository
#[derive(Error, Debug)]
pub enum RepoError {
    /// A write referenced a session id that does not exist
    #[error("invalid reference: session {0} does not exist")]
    InvalidReference(i32),

    /// Could not open or reach the underlying store
    #[error("connection error: {0}")]
    Connection(String),

    /// Query or transaction failure
    #[error("storage error: {0}")]
    Storage(#[from] diesel::result::Error),

    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// Payload could not be encoded for storage
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl RepoError {
    pub fn is_invalid_reference(&self) -> bool {
        matches!(self, RepoError::InvalidReference(_))
    }
}

/// Signal source failures. Always recoverable: the tick is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("signal source unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a single pipeline tick
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("source returned an empty waveform")]
    EmptyWaveform,
}

/// Failures that end a monitoring run
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("could not create monitoring session: {0}")]
    SessionStart(#[source] RepoError),

    #[error("could not close monitoring session {session_id}: {source}")]
    SessionEnd {
        session_id: i32,
        #[source]
        source: RepoError,
    },

    #[error("scheduler cannot start from state {0}")]
    InvalidState(SchedulerStatus),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
