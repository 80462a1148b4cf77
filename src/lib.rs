//! scm-enrich: concurrent, rate-limited SCM metadata enrichment.
//!
//! Looks up default branches and project identifiers for batches of
//! repositories across GitHub, GitLab and Azure DevOps, and turns the
//! enriched records into Snyk import targets.

// Core modules
pub mod aggregate;
pub mod cli;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod records;
pub mod scheduler;
pub mod scm;
pub mod targets;
pub mod tuning;

// Re-export commonly used error types
pub use error::{ErrorKind, PipelineError, SelectionError, TargetsError};
