//! Retry policy, per-job retry state machine, and the controller that drives
//! one job through it.
//!
//! ```text
//! Pending ──► InFlight ──► Success
//!    ▲           │
//!    │           ├──► RetryScheduled ──(delay)──► InFlight
//!    │           └──► Failed
//! ```
//!
//! The transitions are pure and tested without network I/O. The controller
//! adds the side effects: rate-limit acquisition, the client call, backoff
//! sleeps and cancellation.

use rand::RngExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::cancel::{CancelReason, CancelToken};
use super::job::{EnrichmentJob, EnrichmentResult};
use super::rate_limiter::RateLimiter;
use crate::error::ErrorKind;
use crate::metrics::MetricsCollector;
use crate::scm::ScmClient;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_JITTER_MS: u64 = 250;
const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Bounded retries with capped exponential backoff and random jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Upper bound of the uniform jitter added to each delay.
    pub max_jitter_ms: u64,
    /// Cap on the exponential part of the delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_jitter_ms: DEFAULT_MAX_JITTER_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter_ms = jitter.as_millis() as u64;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// `min(base × 2^(attempt − 1), max_delay)` for the attempt that just failed.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let millis = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Delay before the next attempt.
    ///
    /// A server-communicated `retry_after` is a floor on the computed delay.
    pub fn delay_for(
        &self,
        attempt: u32,
        retry_after: Option<Duration>,
        jitter: Duration,
    ) -> Duration {
        let jitter = jitter.min(Duration::from_millis(self.max_jitter_ms));
        let computed = self.backoff_delay(attempt) + jitter;
        retry_after.map_or(computed, |floor| computed.max(floor))
    }

    /// Uniform jitter in `[0, max_jitter]`.
    pub fn sample_jitter(&self) -> Duration {
        if self.max_jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=self.max_jitter_ms))
    }
}

/// Retry state of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    InFlight {
        attempt: u32,
    },
    RetryScheduled {
        attempt: u32,
        delay: Duration,
        last_error: ErrorKind,
    },
    Success {
        attempts: u32,
    },
    Failed {
        attempts: u32,
        kind: ErrorKind,
    },
}

impl JobState {
    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        match *self {
            JobState::Pending => 0,
            JobState::InFlight { attempt } | JobState::RetryScheduled { attempt, .. } => attempt,
            JobState::Success { attempts } | JobState::Failed { attempts, .. } => attempts,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success { .. } | JobState::Failed { .. })
    }

    /// Pending or RetryScheduled → InFlight with the next attempt number.
    pub fn start(self) -> JobState {
        match self {
            JobState::Pending => JobState::InFlight { attempt: 1 },
            JobState::RetryScheduled { attempt, .. } => JobState::InFlight {
                attempt: attempt + 1,
            },
            other => other,
        }
    }

    /// InFlight → Success.
    pub fn succeed(self) -> JobState {
        match self {
            JobState::InFlight { attempt } => JobState::Success { attempts: attempt },
            other => other,
        }
    }

    /// InFlight → RetryScheduled or Failed.
    ///
    /// Only retryable kinds are retried, and only while attempts remain.
    pub fn fail(
        self,
        kind: ErrorKind,
        retry_after: Option<Duration>,
        policy: &RetryPolicy,
        jitter: Duration,
    ) -> JobState {
        let JobState::InFlight { attempt } = self else {
            return self;
        };
        if kind.is_retryable() && attempt < policy.max_attempts {
            JobState::RetryScheduled {
                attempt,
                delay: policy.delay_for(attempt, retry_after, jitter),
                last_error: kind,
            }
        } else {
            JobState::Failed {
                attempts: attempt,
                kind,
            }
        }
    }

    /// Any non-terminal state → Failed; `Unattempted` if nothing was sent yet.
    pub fn cancel(self) -> JobState {
        if self.is_terminal() {
            return self;
        }
        let attempts = self.attempts();
        let kind = if attempts == 0 {
            ErrorKind::Unattempted
        } else {
            ErrorKind::Cancelled
        };
        JobState::Failed { attempts, kind }
    }
}

/// Drives jobs through the retry state machine.
///
/// Shared by all workers of a run.
pub struct RetryController {
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
    cancel: CancelToken,
    metrics: MetricsCollector,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, limiter: Arc<RateLimiter>, cancel: CancelToken) -> Self {
        Self {
            policy,
            limiter,
            cancel,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `job` to a terminal state and returns its result.
    ///
    /// Every attempt first takes a rate-limit token; an unparsable URL fails
    /// before taking one. No attempt starts once the run is cancelled; an
    /// in-flight call is allowed to finish.
    pub async fn drive(
        &self,
        job: &mut EnrichmentJob,
        client: Option<&dyn ScmClient>,
    ) -> EnrichmentResult {
        let (Some(platform), Some(client)) = (job.platform, client) else {
            job.state = JobState::Failed {
                attempts: 0,
                kind: ErrorKind::UnsupportedSource,
            };
            return EnrichmentResult::failure(
                job.ordinal,
                ErrorKind::UnsupportedSource,
                format!("no SCM client for '{}'", job.repository_url),
                0,
            );
        };

        if let Err(error) = client.check_url(&job.repository_url) {
            let kind = error.kind();
            job.state = JobState::Failed { attempts: 0, kind };
            debug!(ordinal = job.ordinal, kind = %kind, "Skipping lookup");
            return EnrichmentResult::failure(job.ordinal, kind, error.to_string(), 0);
        }

        loop {
            if self.cancel.is_cancelled() {
                return self.cancelled(job);
            }

            let waited = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                waited = self.limiter.acquire(platform) => Some(waited),
            };
            let Some(waited) = waited else {
                return self.cancelled(job);
            };
            self.metrics
                .record_rate_limit_wait(platform, waited.as_secs_f64());
            if self.cancel.is_cancelled() {
                return self.cancelled(job);
            }

            job.state = job.state.start();
            let attempt = job.attempts();
            debug!(
                ordinal = job.ordinal,
                attempt,
                url = %job.repository_url,
                "Looking up repository metadata"
            );

            let error = match client.fetch_metadata(&job.repository_url, job.request).await {
                Ok(metadata) => {
                    job.state = job.state.succeed();
                    return EnrichmentResult::success(job.ordinal, metadata, attempt);
                }
                Err(error) => error,
            };

            let kind = error.kind();
            if kind.cancels_run() {
                let first = self.cancel.cancel(CancelReason::AuthFailure {
                    ordinal: job.ordinal,
                    platform: platform.as_str().to_string(),
                });
                if first {
                    warn!(
                        ordinal = job.ordinal,
                        platform = %platform,
                        error = %error,
                        "Authentication failed, cancelling run"
                    );
                }
            }

            job.state = job
                .state
                .fail(kind, error.retry_after(), &self.policy, self.policy.sample_jitter());

            match job.state {
                JobState::RetryScheduled { attempt, delay, .. } => {
                    info!(
                        ordinal = job.ordinal,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        kind = %kind,
                        delay_ms = delay.as_millis() as u64,
                        "Lookup failed, retrying"
                    );
                    self.metrics.record_retry(platform, kind);

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return self.cancelled(job),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                JobState::Failed { attempts, kind } => {
                    debug!(ordinal = job.ordinal, attempts, kind = %kind, "Lookup failed");
                    return EnrichmentResult::failure(
                        job.ordinal,
                        kind,
                        error.to_string(),
                        attempts,
                    );
                }
                _ => {
                    return EnrichmentResult::failure(job.ordinal, kind, error.to_string(), attempt);
                }
            }
        }
    }

    fn cancelled(&self, job: &mut EnrichmentJob) -> EnrichmentResult {
        job.state = job.state.cancel();
        let attempts = job.attempts();
        if attempts == 0 {
            return EnrichmentResult::unattempted(job.ordinal);
        }
        let reason = self
            .cancel
            .reason()
            .map(ToString::to_string)
            .unwrap_or_else(|| "run cancelled".to_string());
        EnrichmentResult::failure(
            job.ordinal,
            ErrorKind::Cancelled,
            format!("cancelled between retries: {reason}"),
            attempts,
        )
    }
}
