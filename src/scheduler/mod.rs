//! Rate-limited, retrying scheduler for metadata lookups.
//!
//! - **JobQueue**: in-process FIFO of pending lookups
//! - **WorkerPool**: fixed set of workers draining the queue concurrently
//! - **RateLimiter**: one token bucket per SCM platform, shared by all workers
//! - **RetryController**: per-job state machine with exponential backoff
//! - **ResultSlots**: write-once output slot per input ordinal
//! - **CancelToken**: run-wide cancellation observed by every worker
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │   JobQueue   │
//!                      └──────┬───────┘
//!                             │
//!         ┌───────────────────┼───────────────────┐
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 1│         │ Worker 2│         │ Worker N│
//!    └────┬────┘         └────┬────┘         └────┬────┘
//!         └──── RateLimiter (per platform) ───────┘
//!                             │
//!                      ┌──────▼───────┐
//!                      │ ResultSlots  │
//!                      └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use scm_enrich::scheduler::*;
//! use std::sync::Arc;
//!
//! let cancel = CancelToken::new();
//! let limiter = RateLimiter::new().with_bucket(ScmPlatform::GitHub, TokenBucket::new(900));
//! let controller = RetryController::new(RetryPolicy::default(), Arc::new(limiter), cancel.clone());
//! let pool = WorkerPool::new(WorkerPoolConfig::new(10), clients, controller, cancel);
//!
//! let slots = Arc::new(ResultSlots::new(jobs.len()));
//! let stats = pool.run(jobs, Arc::clone(&slots)).await?;
//! ```

pub mod cancel;
pub mod job;
pub mod queue;
pub mod rate_limiter;
pub mod retry;
pub mod slots;
pub mod worker_pool;

pub use cancel::{CancelReason, CancelToken};
pub use job::{EnrichmentJob, EnrichmentResult, JobStatus};
pub use queue::JobQueue;
pub use rate_limiter::{RateLimiter, TokenBucket};
pub use retry::{JobState, RetryController, RetryPolicy};
pub use slots::{ResultSlots, SlotError};
pub use worker_pool::{PoolError, PoolStats, WorkerPool, WorkerPoolConfig};
