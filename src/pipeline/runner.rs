//! Enrichment pipeline runner.
//!
//! Turns records into jobs, tunes the pool, runs it and aggregates the
//! results into an [`EnrichmentReport`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::EnrichConfig;
use crate::aggregate::{EnrichmentReport, ResultAggregator};
use crate::error::PipelineError;
use crate::records::{RepositoryRecord, ScmPlatform, SourceType};
use crate::scheduler::{
    CancelReason, CancelToken, EnrichmentJob, PoolStats, RateLimiter, ResultSlots,
    RetryController, TokenBucket, WorkerPool, WorkerPoolConfig,
};
use crate::scm::{build_http_client, MetadataRequest, ScmClients};
use crate::tuning::{tune, TuningConfig};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub report: EnrichmentReport,
    /// Tuning of the run's own platform.
    pub tuning: TuningConfig,
    /// Request budget of every platform that had jobs.
    pub rates: BTreeMap<ScmPlatform, u32>,
    pub pool: PoolStats,
    pub elapsed: Duration,
}

/// Runs one enrichment over a batch of records.
///
/// A pipeline owns one cancellation token; once cancelled it stays
/// cancelled, so build a new pipeline for every run.
pub struct EnrichmentPipeline {
    config: EnrichConfig,
    clients: ScmClients,
    cancel: CancelToken,
}

impl EnrichmentPipeline {
    /// Creates a pipeline over explicit clients.
    pub fn new(config: EnrichConfig, clients: ScmClients) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            clients,
            cancel: CancelToken::new(),
        })
    }

    /// Creates a pipeline with the standard HTTP clients.
    pub fn from_config(config: EnrichConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let http = build_http_client(config.request_timeout())
            .map_err(|e| PipelineError::HttpClient(e.to_string()))?;
        let clients = ScmClients::standard(http, &config.credentials, &config.api_bases);
        Self::new(config, clients)
    }

    pub fn config(&self) -> &EnrichConfig {
        &self.config
    }

    /// Handle for aborting the run from outside.
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Fields a record still needs from the network.
    fn request_for(&self, platform: Option<ScmPlatform>) -> MetadataRequest {
        MetadataRequest {
            branch: self.config.overrides.branch().is_none(),
            identifier: platform.is_some_and(|p| self.clients.requires_identifier(p)),
        }
    }

    /// Builds one job per record that needs a lookup.
    pub fn plan_jobs(&self, records: &[RepositoryRecord]) -> Vec<EnrichmentJob> {
        records
            .iter()
            .enumerate()
            .filter_map(|(ordinal, record)| {
                let platform = ScmPlatform::of_record(record);
                let request = self.request_for(platform);
                if request.is_empty() {
                    debug!(ordinal, "Every field overridden, skipping lookup");
                    return None;
                }
                Some(EnrichmentJob::new(ordinal, record.url(), platform, request))
            })
            .collect()
    }

    /// Enriches `records` and returns one target per record, in order.
    pub async fn run(
        &self,
        records: &[RepositoryRecord],
        source_type: SourceType,
    ) -> Result<RunOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let start = Instant::now();

        for (ordinal, record) in records.iter().enumerate() {
            record.validate(ordinal)?;
        }

        let jobs = self.plan_jobs(records);
        let job_ordinals: Vec<usize> = jobs.iter().map(|j| j.ordinal).collect();
        let tuning = tune(jobs.len(), source_type.platform(), &self.config.tuning);

        let mut rates = BTreeMap::new();
        let mut limiter = RateLimiter::new();
        for platform in ScmPlatform::ALL {
            if !jobs.iter().any(|j| j.platform == Some(platform)) {
                continue;
            }
            let rpm = tune(jobs.len(), platform, &self.config.tuning).requests_per_minute;
            limiter = limiter.with_bucket(platform, TokenBucket::new(rpm));
            rates.insert(platform, rpm);
        }

        info!(
            run_id = %run_id,
            records = records.len(),
            jobs = jobs.len(),
            source = %source_type,
            workers = tuning.worker_count,
            requests_per_minute = tuning.requests_per_minute,
            tier = %tuning.tier,
            "Starting enrichment run"
        );

        let controller = RetryController::new(
            self.config.retry,
            Arc::new(limiter),
            self.cancel.clone(),
        );
        let pool = WorkerPool::new(
            WorkerPoolConfig::new(tuning.worker_count),
            self.clients.clone(),
            controller,
            self.cancel.clone(),
        );

        let timer = self.config.run_timeout().map(|timeout| {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if cancel.cancel(CancelReason::Timeout) {
                    warn!(timeout_secs = timeout.as_secs(), "Run timed out, cancelling");
                }
            })
        });

        let slots = Arc::new(ResultSlots::new(records.len()));
        let pool_result = pool.run(jobs, Arc::clone(&slots)).await;
        if let Some(timer) = timer {
            timer.abort();
        }
        let stats = pool_result.map_err(|e| PipelineError::Worker(e.to_string()))?;

        if let Some(missing) = job_ordinals.iter().find(|&&o| slots.get(o).is_none()) {
            return Err(PipelineError::MissingResult(*missing));
        }
        let results = (0..slots.len()).map(|o| slots.get(o).cloned()).collect();

        let aggregator = ResultAggregator::new(
            &self.config.overrides,
            &self.config.fallback_branch,
            &self.config.default_exclusion_globs,
        );
        let report = aggregator.aggregate(records, results, self.cancel.reason().cloned())?;

        let elapsed = start.elapsed();
        info!(
            run_id = %run_id,
            enriched = report.summary.enriched,
            overridden = report.summary.overridden,
            fallback = report.summary.fallback,
            failed = report.summary.failed,
            complete = report.summary.complete,
            elapsed_ms = elapsed.as_millis() as u64,
            "Enrichment run finished"
        );

        Ok(RunOutcome {
            run_id,
            report,
            tuning,
            rates,
            pool: stats,
            elapsed,
        })
    }
}
