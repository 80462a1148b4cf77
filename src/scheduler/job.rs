//! Job and result types for the enrichment scheduler.
//!
//! - `EnrichmentJob`: one lookup, created from one record that needs it
//! - `EnrichmentResult`: the outcome written into the job's result slot
//! - `JobStatus`: terminal status of a job

use serde::{Deserialize, Serialize};
use std::fmt;

use super::retry::JobState;
use crate::error::ErrorKind;
use crate::records::ScmPlatform;
use crate::scm::{MetadataRequest, PlatformIdentifier, RepoMetadata};

/// A metadata lookup for the record at `ordinal`.
///
/// Owned by exactly one worker while it runs; dropped once its result is
/// written.
#[derive(Debug, Clone)]
pub struct EnrichmentJob {
    /// Position of the record in the input sequence.
    pub ordinal: usize,
    pub repository_url: String,
    /// Resolved platform; `None` means no client can serve the record.
    pub platform: Option<ScmPlatform>,
    /// Fields the lookup must resolve.
    pub request: MetadataRequest,
    /// Retry state, including the attempt counter.
    pub state: JobState,
}

impl EnrichmentJob {
    pub fn new(
        ordinal: usize,
        repository_url: impl Into<String>,
        platform: Option<ScmPlatform>,
        request: MetadataRequest,
    ) -> Self {
        Self {
            ordinal,
            repository_url: repository_url.into(),
            platform,
            request,
            state: JobState::Pending,
        }
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.state.attempts()
    }
}

/// Terminal status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one job, written once into its ordinal's slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub ordinal: usize,
    pub status: JobStatus,
    /// Resolved default branch, if requested and found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub identifier: PlatformIdentifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Network attempts made; never above the policy's maximum.
    pub attempts: u32,
}

impl EnrichmentResult {
    pub fn success(ordinal: usize, metadata: RepoMetadata, attempts: u32) -> Self {
        Self {
            ordinal,
            status: JobStatus::Succeeded,
            branch: metadata.default_branch,
            identifier: metadata.identifier,
            error_kind: None,
            error: None,
            attempts,
        }
    }

    pub fn failure(
        ordinal: usize,
        kind: ErrorKind,
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            ordinal,
            status: JobStatus::Failed,
            branch: None,
            identifier: PlatformIdentifier::NotApplicable,
            error_kind: Some(kind),
            error: Some(error.into()),
            attempts,
        }
    }

    /// The run was cancelled before this job started.
    pub fn unattempted(ordinal: usize) -> Self {
        Self::failure(
            ordinal,
            ErrorKind::Unattempted,
            "run cancelled before the lookup started",
            0,
        )
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}
