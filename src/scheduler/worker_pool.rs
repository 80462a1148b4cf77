//! Worker pool for draining the enrichment job queue.
//!
//! A fixed number of workers run as independent async tasks over one shared
//! queue. Each worker loops: dequeue a job, drive it through the retry
//! controller (which takes the rate-limit token), write the result into the
//! job's slot. Workers stop when the queue is empty or the run is cancelled.
//!
//! # Features
//!
//! - Worker count fixed for the whole run
//! - Cancellation stops dequeuing; leftover jobs are recorded as unattempted
//! - Pool statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::cancel::CancelToken;
use super::job::{EnrichmentJob, EnrichmentResult};
use super::queue::JobQueue;
use super::retry::RetryController;
use super::slots::{ResultSlots, SlotError};
use crate::error::ErrorKind;
use crate::metrics::MetricsCollector;
use crate::scm::ScmClients;

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A worker task panicked or was aborted.
    #[error("Worker task failed: {0}")]
    WorkerFailed(String),

    /// A result slot rejected a write.
    #[error("Result slot error: {0}")]
    Slot(#[from] SlotError),
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { num_workers: 10 }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self { num_workers }
    }
}

/// Statistics about a pool run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    /// Number of workers in the pool.
    pub num_workers: usize,
    /// Number of workers currently driving a job.
    pub active_workers: usize,
    /// Jobs that reached Success.
    pub jobs_succeeded: u64,
    /// Jobs that reached Failed after at least one attempt, or failed fast.
    pub jobs_failed: u64,
    /// Jobs never started because the run was cancelled.
    pub jobs_unattempted: u64,
    /// Average time a worker spent on one job, rate-limit waits included.
    pub average_job_duration: Duration,
}

impl PoolStats {
    /// Returns the number of jobs a worker picked up.
    pub fn total_processed(&self) -> u64 {
        self.jobs_succeeded + self.jobs_failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.jobs_succeeded as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
#[derive(Debug, Default)]
struct SharedPoolStats {
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_unattempted: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn record(&self, result: &EnrichmentResult, duration: Duration) {
        let counter = if result.is_success() {
            &self.jobs_succeeded
        } else if result.error_kind == Some(ErrorKind::Unattempted) {
            &self.jobs_unattempted
        } else {
            &self.jobs_failed
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_unattempted(&self) {
        self.jobs_unattempted.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let succeeded = self.jobs_succeeded.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let unattempted = self.jobs_unattempted.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);
        let active = self.active_workers.load(Ordering::SeqCst);

        let processed = succeeded + failed;
        let average_duration = if processed > 0 {
            Duration::from_millis(total_duration_ms / processed)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            active_workers: active as usize,
            jobs_succeeded: succeeded,
            jobs_failed: failed,
            jobs_unattempted: unattempted,
            average_job_duration: average_duration,
        }
    }
}

/// Bounded pool of workers sharing one queue, one controller and one set of
/// result slots.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    clients: ScmClients,
    controller: Arc<RetryController>,
    cancel: CancelToken,
    stats: Arc<SharedPoolStats>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        clients: ScmClients,
        controller: RetryController,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            clients,
            controller: Arc::new(controller),
            cancel,
            stats: Arc::new(SharedPoolStats::default()),
        }
    }

    /// Processes every job and fills its slot.
    ///
    /// Returns once all workers have stopped. Jobs left in the queue after a
    /// cancellation are written as unattempted, so every job's slot is filled
    /// when this returns `Ok`.
    pub async fn run(
        &self,
        jobs: Vec<EnrichmentJob>,
        slots: Arc<ResultSlots>,
    ) -> Result<PoolStats, PoolError> {
        let job_count = jobs.len();
        let queue = Arc::new(JobQueue::from_jobs(jobs));
        let num_workers = self.config.num_workers.max(1).min(job_count.max(1));
        let metrics = MetricsCollector::new();
        metrics.set_queue_depth(job_count);

        info!(jobs = job_count, workers = num_workers, "Worker pool started");

        let mut handles: Vec<JoinHandle<Result<(), PoolError>>> = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            let worker = Worker {
                id: format!("worker-{}", i),
                queue: Arc::clone(&queue),
                clients: self.clients.clone(),
                controller: Arc::clone(&self.controller),
                slots: Arc::clone(&slots),
                cancel: self.cancel.clone(),
                stats: Arc::clone(&self.stats),
                metrics,
            };
            handles.push(tokio::spawn(worker.run()));
        }

        let mut first_error = None;
        for joined in futures::future::join_all(handles).await {
            let outcome = match joined {
                Ok(result) => result,
                Err(e) => Err(PoolError::WorkerFailed(e.to_string())),
            };
            if let Err(e) = outcome {
                error!(error = %e, "Worker stopped with an error");
                first_error.get_or_insert(e);
            }
        }

        let leftover = queue.drain();
        if !leftover.is_empty() {
            warn!(
                unattempted = leftover.len(),
                reason = ?self.cancel.reason(),
                "Run cancelled with jobs still queued"
            );
        }
        for job in leftover {
            slots.fill(EnrichmentResult::unattempted(job.ordinal))?;
            self.stats.record_unattempted();
        }
        metrics.set_queue_depth(0);

        if let Some(e) = first_error {
            return Err(e);
        }

        let stats = self.stats();
        info!(
            succeeded = stats.jobs_succeeded,
            failed = stats.jobs_failed,
            unattempted = stats.jobs_unattempted,
            "Worker pool finished"
        );
        Ok(stats)
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.num_workers)
    }

    /// Returns the number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }
}

/// A single worker draining the shared queue.
struct Worker {
    id: String,
    queue: Arc<JobQueue>,
    clients: ScmClients,
    controller: Arc<RetryController>,
    slots: Arc<ResultSlots>,
    cancel: CancelToken,
    stats: Arc<SharedPoolStats>,
    metrics: MetricsCollector,
}

impl Worker {
    /// Main worker loop.
    async fn run(self) -> Result<(), PoolError> {
        debug!(worker_id = %self.id, "Worker started");

        loop {
            if self.cancel.is_cancelled() {
                debug!(worker_id = %self.id, "Worker observed cancellation");
                break;
            }
            let Some(job) = self.queue.dequeue() else {
                break;
            };
            self.metrics.set_queue_depth(self.queue.len());
            self.process_job(job).await?;
        }

        debug!(worker_id = %self.id, "Worker stopped");
        Ok(())
    }

    async fn process_job(&self, mut job: EnrichmentJob) -> Result<(), PoolError> {
        let start_time = Instant::now();
        self.stats.increment_active();
        self.metrics.worker_busy();

        let client = job.platform.and_then(|p| self.clients.get(p));
        let result = self.controller.drive(&mut job, client.as_deref()).await;

        self.metrics.worker_idle();
        self.stats.decrement_active();
        let duration = start_time.elapsed();
        self.stats.record(&result, duration);
        if let Some(platform) = job.platform {
            self.metrics
                .record_lookup(platform, result.error_kind, result.attempts);
        }

        if result.is_success() {
            debug!(
                worker_id = %self.id,
                ordinal = job.ordinal,
                attempts = result.attempts,
                duration_ms = duration.as_millis() as u64,
                "Lookup succeeded"
            );
        } else {
            warn!(
                worker_id = %self.id,
                ordinal = job.ordinal,
                url = %job.repository_url,
                kind = ?result.error_kind,
                attempts = result.attempts,
                "Lookup failed"
            );
        }

        self.slots.fill(result)?;
        Ok(())
    }
}
