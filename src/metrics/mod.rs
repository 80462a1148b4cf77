//! Metrics module for Prometheus-based monitoring.
//!
//! Tracks lookup outcomes, retries, rate-limit waits and worker activity.
//! Nothing is served over HTTP; the CLI writes the exposition text to a file
//! after a run.
//!
//! # Example
//!
//! ```ignore
//! use scm_enrich::metrics::{init_metrics, export_metrics};
//!
//! init_metrics()?;
//! // ... run the pipeline ...
//! std::fs::write("metrics.prom", export_metrics())?;
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ACTIVE_WORKERS, LOOKUPS_TOTAL, LOOKUP_ATTEMPTS, QUEUE_DEPTH, RATE_LIMIT_WAIT, REGISTRY,
    RETRIES_TOTAL,
};
