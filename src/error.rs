//! Error types for scm-enrich operations.
//!
//! Defines the lookup error taxonomy shared by the SCM clients, the retry
//! controller and the result aggregator, plus the errors raised by the
//! glue around the core:
//! - Record selection (row specs, validation)
//! - Organisation directory and target file I/O
//! - Pipeline setup

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failed lookup.
///
/// Every per-job failure is reduced to one of these kinds. The kind alone
/// decides whether the retry controller tries again, whether the run is
/// cancelled, and how the aggregator treats the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Retryable network or server fault.
    Transient,
    /// Retryable; the server asked us to slow down.
    RateLimited,
    /// Repository missing or private. Non-fatal, triggers the fallback branch.
    NotFound,
    /// Credentials rejected. Fatal to the whole run.
    AuthError,
    /// The record's source is not served by any SCM client.
    UnsupportedSource,
    /// The response parsed but did not carry the expected fields.
    MalformedResponse,
    /// The repository URL could not be parsed for its platform.
    InvalidRepositoryUrl,
    /// The job was never started because the run was cancelled.
    Unattempted,
    /// The job was started but cancellation stopped it between attempts.
    Cancelled,
}

impl ErrorKind {
    /// Returns whether another attempt may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::RateLimited)
    }

    /// Returns whether this failure must cancel the whole run.
    pub fn cancels_run(self) -> bool {
        self == ErrorKind::AuthError
    }

    /// Stable snake_case name, used for metric labels and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AuthError => "auth_error",
            ErrorKind::UnsupportedSource => "unsupported_source",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::InvalidRepositoryUrl => "invalid_repository_url",
            ErrorKind::Unattempted => "unattempted",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while selecting which records enter a run.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Invalid row specification '{spec}': {reason}")]
    InvalidRowSpec { spec: String, reason: String },

    #[error("Invalid row numbers {rows:?}: input has {available} rows (valid range: 1-{available})")]
    RowsOutOfRange { rows: Vec<usize>, available: usize },

    #[error("Record {ordinal} has an empty application name")]
    EmptyApplicationName { ordinal: usize },

    #[error("Unknown source type '{0}' (expected github, github-cloud-app, github-enterprise, gitlab or azure-repos)")]
    UnknownSourceType(String),

    #[error("Limit must be a positive integer")]
    InvalidLimit,
}

/// Errors raised while loading organisations or writing target files.
#[derive(Debug, Error)]
pub enum TargetsError {
    #[error("Organisation file '{path}' could not be read: {source}")]
    ReadOrgs {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Organisation file '{path}' is not valid JSON: {source}")]
    ParseOrgs {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while setting up or running the enrichment pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::pipeline::ConfigError),

    #[error("Record selection failed: {0}")]
    Selection(#[from] SelectionError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Result slot {0} was never filled")]
    MissingResult(usize),

    #[error("Worker task failed: {0}")]
    Worker(String),
}
