//! Core error types for studyplan-core.
//!
//! The session engine reports every failure through [`SessionError`]. The
//! configuration layer and the HTTP reporter have their own enums which are
//! folded into `SessionError` where they cross the engine boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds surfaced by the session engine.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The plan handed to `start` is malformed.
    #[error("Invalid session plan: {0}")]
    InvalidPlan(String),

    /// A transition was invoked in a state that does not support it.
    #[error("Cannot {operation}: {detail}")]
    PreconditionViolation {
        operation: &'static str,
        detail: String,
    },

    /// The completion reporter rejected or failed the finalize call.
    /// Retrying `finalize()` is safe; the snapshot was left intact.
    #[error("Completion report failed: {0}")]
    ReportingFailure(String),

    /// The snapshot slot could not be read, written or cleared.
    #[error("Snapshot persistence failed: {0}")]
    PersistenceFailure(String),
}

impl SessionError {
    pub(crate) fn precondition(operation: &'static str, detail: impl Into<String>) -> Self {
        SessionError::PreconditionViolation {
            operation,
            detail: detail.into(),
        }
    }

    /// Whether the caller may retry the failed operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::ReportingFailure(_))
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(#[from] std::io::Error),
}

/// Completion reporter transport errors.
#[derive(Error, Debug)]
pub enum ReporterError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Reporter responded with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid reporter URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

impl From<ReporterError> for SessionError {
    fn from(err: ReporterError) -> Self {
        SessionError::ReportingFailure(err.to_string())
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(err: rusqlite::Error) -> Self {
        SessionError::PersistenceFailure(err.to_string())
    }
}

/// Result type alias for SessionError
pub type Result<T, E = SessionError> = std::result::Result<T, E>;
