//! In-process job queue shared by the workers of one run.
//!
//! Filled once before the workers start, then drained concurrently. The
//! lock is only held for a push or pop, never across an await point.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::job::EnrichmentJob;

/// FIFO queue of pending jobs.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<EnrichmentJob>>,
}

impl JobQueue {
    /// Creates a queue holding `jobs` in order.
    pub fn from_jobs(jobs: impl IntoIterator<Item = EnrichmentJob>) -> Self {
        Self {
            jobs: Mutex::new(jobs.into_iter().collect()),
        }
    }

    /// Takes the next job, or `None` once the queue is empty.
    pub fn dequeue(&self) -> Option<EnrichmentJob> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes and returns every job still queued.
    pub fn drain(&self) -> Vec<EnrichmentJob> {
        self.lock().drain(..).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<EnrichmentJob>> {
        // A worker that panicked mid-pop leaves the deque itself consistent.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
