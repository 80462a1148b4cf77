//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by scm-enrich and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all scm-enrich metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Finished lookups, labeled by platform and outcome (success or error kind).
pub static LOOKUPS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Attempts used per finished lookup.
pub static LOOKUP_ATTEMPTS: OnceLock<Histogram> = OnceLock::new();

/// Scheduled retries, labeled by platform and the error kind that caused them.
pub static RETRIES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Time spent waiting for a rate-limit token, labeled by platform.
pub static RATE_LIMIT_WAIT: OnceLock<HistogramVec> = OnceLock::new();

/// Number of workers currently driving a job.
pub static ACTIVE_WORKERS: OnceLock<Gauge> = OnceLock::new();

/// Jobs still waiting in the queue.
pub static QUEUE_DEPTH: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once keeps the first registry; later calls build
/// and discard a fresh one.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let lookups_total = CounterVec::new(
        Opts::new("scm_enrich_lookups_total", "Finished SCM metadata lookups"),
        &["platform", "outcome"],
    )?;

    let lookup_attempts = Histogram::with_opts(
        HistogramOpts::new(
            "scm_enrich_lookup_attempts",
            "Attempts used per finished lookup",
        )
        .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 8.0, 10.0]),
    )?;

    let retries_total = CounterVec::new(
        Opts::new("scm_enrich_retries_total", "Retries scheduled after a failed attempt"),
        &["platform", "kind"],
    )?;

    let rate_limit_wait = HistogramVec::new(
        HistogramOpts::new(
            "scm_enrich_rate_limit_wait_seconds",
            "Time spent waiting for a rate-limit token",
        )
        .buckets(vec![0.0, 0.1, 0.5, 1.0, 2.0, 5.0, 15.0, 60.0]),
        &["platform"],
    )?;

    let active_workers = Gauge::new(
        "scm_enrich_active_workers",
        "Number of workers currently driving a job",
    )?;

    let queue_depth = Gauge::new("scm_enrich_queue_depth", "Jobs waiting in the queue")?;

    registry.register(Box::new(lookups_total.clone()))?;
    registry.register(Box::new(lookup_attempts.clone()))?;
    registry.register(Box::new(retries_total.clone()))?;
    registry.register(Box::new(rate_limit_wait.clone()))?;
    registry.register(Box::new(active_workers.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;

    // Already-set statics mean a previous call won (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = LOOKUPS_TOTAL.set(lookups_total);
    let _ = LOOKUP_ATTEMPTS.set(lookup_attempts);
    let _ = RETRIES_TOTAL.set(retries_total);
    let _ = RATE_LIMIT_WAIT.set(rate_limit_wait);
    let _ = ACTIVE_WORKERS.set(active_workers);
    let _ = QUEUE_DEPTH.set(queue_depth);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead of metrics when the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
