//! High-level recording interface over the raw Prometheus metrics.
//!
//! Every method is a no-op until `init_metrics()` has run, so library code
//! can record unconditionally.

use super::prometheus::{
    ACTIVE_WORKERS, LOOKUPS_TOTAL, LOOKUP_ATTEMPTS, QUEUE_DEPTH, RATE_LIMIT_WAIT, RETRIES_TOTAL,
};
use crate::error::ErrorKind;
use crate::records::ScmPlatform;

/// Metrics collector for recording enrichment metrics.
///
/// # Example
///
/// ```ignore
/// use scm_enrich::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics()?;
/// let collector = MetricsCollector::new();
/// collector.record_lookup(ScmPlatform::GitHub, None, 1);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Records a finished lookup; `failure` is `None` on success.
    pub fn record_lookup(&self, platform: ScmPlatform, failure: Option<ErrorKind>, attempts: u32) {
        let outcome = failure.map_or("success", ErrorKind::as_str);

        if let Some(lookups) = LOOKUPS_TOTAL.get() {
            lookups
                .with_label_values(&[platform.as_str(), outcome])
                .inc();
        }
        if attempts > 0 {
            if let Some(histogram) = LOOKUP_ATTEMPTS.get() {
                histogram.observe(f64::from(attempts));
            }
        }

        tracing::trace!(platform = platform.as_str(), outcome, attempts, "Recorded lookup metric");
    }

    /// Records a retry scheduled after an attempt failed with `kind`.
    pub fn record_retry(&self, platform: ScmPlatform, kind: ErrorKind) {
        if let Some(retries) = RETRIES_TOTAL.get() {
            retries
                .with_label_values(&[platform.as_str(), kind.as_str()])
                .inc();
        }
    }

    /// Records how long a worker waited for a rate-limit token.
    pub fn record_rate_limit_wait(&self, platform: ScmPlatform, wait_secs: f64) {
        if let Some(wait) = RATE_LIMIT_WAIT.get() {
            wait.with_label_values(&[platform.as_str()])
                .observe(wait_secs);
        }
    }

    pub fn worker_busy(&self) {
        if let Some(gauge) = ACTIVE_WORKERS.get() {
            gauge.inc();
        }
    }

    pub fn worker_idle(&self) {
        if let Some(gauge) = ACTIVE_WORKERS.get() {
            gauge.dec();
        }
    }

    /// Sets the number of jobs still queued.
    pub fn set_queue_depth(&self, depth: usize) {
        if let Some(gauge) = QUEUE_DEPTH.get() {
            gauge.set(depth as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    #[test]
    fn test_recording_shows_up_in_export() {
        init_metrics().expect("init");
        let collector = MetricsCollector::new();

        collector.record_lookup(ScmPlatform::GitLab, Some(ErrorKind::NotFound), 1);
        collector.record_retry(ScmPlatform::GitLab, ErrorKind::Transient);
        collector.record_rate_limit_wait(ScmPlatform::GitLab, 0.25);
        collector.set_queue_depth(3);

        let text = export_metrics();
        assert!(text.contains(r#"outcome="not_found""#));
        assert!(text.contains(r#"kind="transient""#));
        assert!(text.contains("scm_enrich_rate_limit_wait_seconds"));
    }
}
