//! Per-platform token-bucket rate limiting.
//!
//! Each bucket refills continuously at `requests_per_minute / 60` tokens per
//! second up to its capacity. Waiters queue on a FIFO-fair async mutex and
//! the head of the queue sleeps while holding it, so permits are granted in
//! arrival order and a waiter only blocks its own worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::records::ScmPlatform;

/// Absorbs float drift in the refill arithmetic.
const TOKEN_EPSILON: f64 = 1e-9;
const MIN_WAIT: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A continuously refilled token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    requests_per_minute: u32,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Bucket with capacity 1: no burst, so any 60-second window holds at
    /// most `requests_per_minute` permits.
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_burst(requests_per_minute, 1)
    }

    /// Bucket that starts full with `burst` tokens.
    ///
    /// A burst above 1 lets a window hold up to `requests_per_minute + burst - 1`.
    pub fn with_burst(requests_per_minute: u32, burst: u32) -> Self {
        let requests_per_minute = requests_per_minute.max(1);
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            refill_per_sec: f64::from(requests_per_minute) / 60.0,
            requests_per_minute,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Waits for a permit and returns how long the caller waited.
    ///
    /// Dropping the future before it resolves consumes no token.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        let mut state = self.state.lock().await;

        loop {
            let now = Instant::now();
            let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
            state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            state.last_refill = now;

            if state.tokens >= 1.0 - TOKEN_EPSILON {
                state.tokens = (state.tokens - 1.0).max(0.0);
                return started.elapsed();
            }

            let deficit = 1.0 - state.tokens;
            // A zero-length sleep would accrue nothing and spin.
            let wait = Duration::from_secs_f64(deficit / self.refill_per_sec).max(MIN_WAIT);
            trace!(wait_ms = wait.as_millis() as u64, "Waiting for rate-limit token");
            sleep(wait).await;
        }
    }
}

/// One token bucket per platform, shared by all workers of a run.
#[derive(Debug, Default, Clone)]
pub struct RateLimiter {
    buckets: HashMap<ScmPlatform, Arc<TokenBucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the bucket for a platform.
    pub fn with_bucket(mut self, platform: ScmPlatform, bucket: TokenBucket) -> Self {
        self.buckets.insert(platform, Arc::new(bucket));
        self
    }

    pub fn bucket(&self, platform: ScmPlatform) -> Option<&Arc<TokenBucket>> {
        self.buckets.get(&platform)
    }

    /// Waits for a permit for `platform`.
    ///
    /// Platforms without a bucket are not limited.
    pub async fn acquire(&self, platform: ScmPlatform) -> Duration {
        match self.buckets.get(&platform) {
            Some(bucket) => bucket.acquire().await,
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Largest number of instants inside any half-open window `[t, t + window)`.
    fn max_in_window(times: &[Duration], window: Duration) -> usize {
        let mut sorted = times.to_vec();
        sorted.sort();
        let mut best = 0;
        for (i, start) in sorted.iter().enumerate() {
            let count = sorted[i..].iter().take_while(|t| **t < *start + window).count();
            best = best.max(count);
        }
        best
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_token_is_immediate() {
        let bucket = TokenBucket::new(60);
        assert_eq!(bucket.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_rate() {
        let bucket = TokenBucket::new(60);
        let start = Instant::now();
        for _ in 0..5 {
            bucket.acquire().await;
        }
        // 1 immediate + 4 refills at one per second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(4100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_never_exceeds_rate() {
        let rpm = 80;
        let bucket = Arc::new(TokenBucket::new(rpm));
        let start = Instant::now();
        let stamps = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let bucket = Arc::clone(&bucket);
            let stamps = Arc::clone(&stamps);
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    bucket.acquire().await;
                    stamps.lock().expect("lock").push(start.elapsed());
                }
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }

        let stamps = stamps.lock().expect("lock").clone();
        assert_eq!(stamps.len(), 200);
        let peak = max_in_window(&stamps, Duration::from_secs(60));
        assert!(peak <= rpm as usize, "{peak} permits in one window");
        assert!(peak >= rpm as usize - 1, "limiter far below budget: {peak}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order() {
        let bucket = Arc::new(TokenBucket::new(60));
        bucket.acquire().await;

        let order = Arc::new(StdMutex::new(Vec::new()));
        let mut handles = Vec::new();
        for id in 0..4 {
            let bucket = Arc::clone(&bucket);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                bucket.acquire().await;
                order.lock().expect("lock").push(id);
            }));
            // Let each task reach the lock queue before spawning the next.
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.expect("task");
        }
        assert_eq!(*order.lock().expect("lock"), vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_acquire_consumes_nothing() {
        let bucket = TokenBucket::new(60);
        bucket.acquire().await;

        // Abandon a waiter halfway through its wait.
        let abandoned = tokio::time::timeout(Duration::from_millis(500), bucket.acquire()).await;
        assert!(abandoned.is_err());

        // The token accrued so far is still there: half a second remains.
        let waited = bucket.acquire().await;
        assert!(waited <= Duration::from_millis(510), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_capacity() {
        let bucket = TokenBucket::with_burst(60, 3);
        for _ in 0..3 {
            assert_eq!(bucket.acquire().await, Duration::ZERO);
        }
        assert!(bucket.acquire().await >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_is_per_platform() {
        let limiter = RateLimiter::new()
            .with_bucket(ScmPlatform::GitHub, TokenBucket::new(1))
            .with_bucket(ScmPlatform::GitLab, TokenBucket::new(1));

        assert_eq!(limiter.acquire(ScmPlatform::GitHub).await, Duration::ZERO);
        // GitHub's bucket is empty but GitLab's is untouched.
        assert_eq!(limiter.acquire(ScmPlatform::GitLab).await, Duration::ZERO);
        // No bucket means no limit.
        assert_eq!(limiter.acquire(ScmPlatform::AzureDevOps).await, Duration::ZERO);
        assert_eq!(limiter.bucket(ScmPlatform::GitHub).map(|b| b.requests_per_minute()), Some(1));
    }
}
