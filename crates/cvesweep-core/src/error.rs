//! Error types for cvesweep.
//!
//! Only [`ConfigError`] and [`EnumerationError`] are fatal. Everything that
//! happens inside a single unit's pipeline is a [`UnitError`] and stays there.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration could not be loaded or is invalid. The process cannot start.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The workload listing failed. Fatal to the run: there is nothing to scan.
#[derive(Error, Debug)]
pub enum EnumerationError {
    #[error("Failed to list containers: {0}")]
    Lister(#[from] ExecError),

    #[error("No running containers found")]
    Empty,

    #[error("Malformed container record on line {line}: '{record}' (expected '<id> <image>')")]
    MalformedRecord { line: usize, record: String },

    #[error("Container '{0}' listed more than once")]
    DuplicateUnit(String),
}

/// Failure of an external process invocation.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("'{0}' was cancelled")]
    Cancelled(String),
}

/// A per-unit pipeline failure. Logged and recorded, never escalated.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("SBOM generation failed: {0}")]
    Artifact(#[source] ExecError),

    #[error("Vulnerability scan failed: {0}")]
    Scan(#[source] ExecError),

    #[error("Failed to parse vulnerability report: {0}")]
    Parse(String),

    #[error("Cancelled before completion")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UnitError {
    /// Map a generation error, keeping cancellation distinguishable.
    pub fn artifact(err: ExecError) -> Self {
        match err {
            ExecError::Cancelled(_) => UnitError::Cancelled,
            other => UnitError::Artifact(other),
        }
    }

    pub fn scan(err: ExecError) -> Self {
        match err {
            ExecError::Cancelled(_) => UnitError::Cancelled,
            other => UnitError::Scan(other),
        }
    }
}

impl From<serde_json::Error> for UnitError {
    fn from(err: serde_json::Error) -> Self {
        UnitError::Parse(err.to_string())
    }
}

/// Rejected write to the result store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Results for unit '{0}' were already written")]
    DuplicateUnit(String),
}

/// Notification delivery failure. Logged, never fatal.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("topic is not set")]
    MissingTopic,

    #[error("Invalid server URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification timed out after {0:?}")]
    Timeout(Duration),

    #[error("Notification task did not complete: {0}")]
    Task(String),
}
