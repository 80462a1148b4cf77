//! Result aggregation.
//!
//! Merges each input record with its lookup outcome (or the caller's
//! overrides) into an [`ImportTarget`], in input order, and builds the
//! [`FailureSummary`] for the run. No record is ever dropped: a failed
//! lookup still yields a target, marked [`TargetStatus::Failed`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ErrorKind, PipelineError};
use crate::records::{FieldOverrides, RepositoryRecord, ScmPlatform};
use crate::scheduler::{CancelReason, EnrichmentResult};

/// How a target's fields were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Every looked-up field came from the SCM API.
    Enriched,
    /// No lookup was needed; the overrides supplied every field.
    Overridden,
    /// The repository or its default branch was not found; the fallback branch applies.
    Fallback,
    /// The lookup failed; the target is reported in the failure summary.
    Failed,
}

/// A record merged with its enrichment, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTarget {
    pub ordinal: usize,
    pub application_name: String,
    pub repository_url: String,
    pub platform: Option<ScmPlatform>,
    pub branch: Option<String>,
    /// Platform project id, for platforms that address targets by id.
    pub identifier: Option<String>,
    pub files: Vec<String>,
    pub exclusion_globs: String,
    pub status: TargetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

impl ImportTarget {
    pub fn is_failed(&self) -> bool {
        self.status == TargetStatus::Failed
    }
}

/// One failed lookup, as listed in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedLookup {
    pub ordinal: usize,
    pub repository_url: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-run failure report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub total: usize,
    pub enriched: usize,
    pub overridden: usize,
    pub fallback: usize,
    pub failed: usize,
    /// Failed lookups per error kind, `not_found` included.
    pub counts_by_kind: BTreeMap<ErrorKind, usize>,
    /// Every failed lookup in input order, `not_found` included.
    pub failures: Vec<FailedLookup>,
    /// False when the run was cancelled before every job ran.
    pub complete: bool,
    /// Jobs never started because of the cancellation.
    pub unattempted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<CancelReason>,
}

impl FailureSummary {
    /// Whether any lookup failed, not-found fallbacks included.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Repository URLs of the failed lookups.
    pub fn failing_urls(&self) -> Vec<&str> {
        self.failures
            .iter()
            .map(|f| f.repository_url.as_str())
            .collect()
    }

    /// Whether the run stopped because credentials were rejected.
    pub fn cancelled_by_auth(&self) -> bool {
        matches!(self.cancel_reason, Some(CancelReason::AuthFailure { .. }))
    }

    fn count(&mut self, target: &ImportTarget) {
        match target.status {
            TargetStatus::Enriched => self.enriched += 1,
            TargetStatus::Overridden => self.overridden += 1,
            TargetStatus::Fallback => self.fallback += 1,
            TargetStatus::Failed => self.failed += 1,
        }
        let Some(kind) = target.error_kind else {
            return;
        };
        *self.counts_by_kind.entry(kind).or_default() += 1;
        if kind == ErrorKind::Unattempted {
            self.unattempted += 1;
        }
        self.failures.push(FailedLookup {
            ordinal: target.ordinal,
            repository_url: target.repository_url.clone(),
            kind,
            error: target.error.clone(),
        });
    }
}

/// The two artifacts of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    /// One target per input record, in input order.
    pub targets: Vec<ImportTarget>,
    pub summary: FailureSummary,
}

/// Merges lookup results with records and overrides.
#[derive(Debug, Clone)]
pub struct ResultAggregator<'a> {
    overrides: &'a FieldOverrides,
    fallback_branch: &'a str,
    default_exclusion_globs: &'a str,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(
        overrides: &'a FieldOverrides,
        fallback_branch: &'a str,
        default_exclusion_globs: &'a str,
    ) -> Self {
        Self {
            overrides,
            fallback_branch,
            default_exclusion_globs,
        }
    }

    /// Builds the report.
    ///
    /// `results[i]` is the outcome for `records[i]`; `None` means no lookup
    /// was needed for that record.
    pub fn aggregate(
        &self,
        records: &[RepositoryRecord],
        results: Vec<Option<EnrichmentResult>>,
        cancel_reason: Option<CancelReason>,
    ) -> Result<EnrichmentReport, PipelineError> {
        if results.len() != records.len() {
            return Err(PipelineError::MissingResult(results.len().min(records.len())));
        }

        let mut summary = FailureSummary {
            total: records.len(),
            complete: cancel_reason.is_none(),
            cancel_reason,
            ..Default::default()
        };

        let targets: Vec<ImportTarget> = records
            .iter()
            .zip(results)
            .enumerate()
            .map(|(ordinal, (record, result))| self.merge(ordinal, record, result))
            .collect();
        for target in &targets {
            summary.count(target);
        }

        Ok(EnrichmentReport { targets, summary })
    }

    fn merge(
        &self,
        ordinal: usize,
        record: &RepositoryRecord,
        result: Option<EnrichmentResult>,
    ) -> ImportTarget {
        let branch_override = self.overrides.branch().map(str::to_string);
        let mut target = ImportTarget {
            ordinal,
            application_name: record.application_name.trim().to_string(),
            repository_url: record.url().to_string(),
            platform: ScmPlatform::of_record(record),
            branch: branch_override.clone(),
            identifier: None,
            files: self.overrides.file_paths(),
            exclusion_globs: self
                .overrides
                .exclusion_globs_or(self.default_exclusion_globs),
            status: TargetStatus::Overridden,
            error_kind: None,
            error: None,
            attempts: 0,
        };

        let Some(result) = result else {
            return target;
        };
        target.attempts = result.attempts;

        if result.is_success() {
            target.identifier = result.identifier.as_id().map(str::to_string);
            match branch_override.or(result.branch) {
                Some(branch) => {
                    target.branch = Some(branch);
                    target.status = TargetStatus::Enriched;
                }
                None => {
                    // The platform knows the repository but reports no default branch.
                    target.branch = Some(self.fallback_branch.to_string());
                    target.status = TargetStatus::Fallback;
                }
            }
            return target;
        }

        target.error_kind = result.error_kind;
        target.error = result.error;
        if result.error_kind == Some(ErrorKind::NotFound) {
            target.branch = Some(
                target
                    .branch
                    .take()
                    .unwrap_or_else(|| self.fallback_branch.to_string()),
            );
            target.status = TargetStatus::Fallback;
        } else {
            target.status = TargetStatus::Failed;
        }
        target
    }
}
