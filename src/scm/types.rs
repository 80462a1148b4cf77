//! Shared types for SCM clients.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::error::ErrorKind;

/// Errors returned by a single SCM lookup.
///
/// Clients never retry; the retry controller decides from `kind()`.
#[derive(Debug, Error)]
pub enum ScmError {
    /// Network failure, timeout, 5xx or an unreadable body.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The platform asked us to slow down.
    #[error("Rate limited: retry after {retry_after:?}")]
    RateLimited {
        /// Server-communicated wait, if any.
        retry_after: Option<Duration>,
    },

    /// The repository does not exist or is not visible with our credentials.
    #[error("Repository not found or private: {0}")]
    NotFound(String),

    /// Credentials were missing or rejected.
    #[error("Authentication failed ({status}): {message}")]
    Auth {
        /// HTTP status, or 0 when no request was sent.
        status: u16,
        message: String,
    },

    /// No client serves the record's source.
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    /// The body parsed but lacked the expected fields.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The repository URL could not be parsed for the platform.
    #[error("Invalid repository URL: {0}")]
    InvalidUrl(String),
}

impl ScmError {
    /// Classification used by the retry controller and the aggregator.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScmError::Transient(_) => ErrorKind::Transient,
            ScmError::RateLimited { .. } => ErrorKind::RateLimited,
            ScmError::NotFound(_) => ErrorKind::NotFound,
            ScmError::Auth { .. } => ErrorKind::AuthError,
            ScmError::UnsupportedSource(_) => ErrorKind::UnsupportedSource,
            ScmError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            ScmError::InvalidUrl(_) => ErrorKind::InvalidRepositoryUrl,
        }
    }

    /// Server-communicated wait for rate-limited errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ScmError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for SCM lookups.
pub type ScmResult<T> = Result<T, ScmError>;

/// Platform-specific project identifier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformIdentifier {
    /// The platform addresses repositories by URL; no identifier needed.
    #[default]
    NotApplicable,
    /// Opaque or numeric project id (GitLab).
    Id(String),
}

impl PlatformIdentifier {
    /// The identifier value, if applicable.
    pub fn as_id(&self) -> Option<&str> {
        match self {
            PlatformIdentifier::NotApplicable => None,
            PlatformIdentifier::Id(id) => Some(id),
        }
    }
}

/// Which fields a lookup must resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataRequest {
    /// Resolve the default branch.
    pub branch: bool,
    /// Resolve the platform identifier.
    pub identifier: bool,
}

impl MetadataRequest {
    /// Returns whether nothing needs resolving.
    pub fn is_empty(&self) -> bool {
        !self.branch && !self.identifier
    }
}

/// Fields resolved by one lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepoMetadata {
    /// Default branch, when requested.
    pub default_branch: Option<String>,
    /// Platform identifier, when requested.
    pub identifier: PlatformIdentifier,
}
