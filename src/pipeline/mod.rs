//! Enrichment pipeline.
//!
//! # Pipeline Flow
//!
//! 1. **Planning**: one job per record that still needs a field from the network
//! 2. **Tuning**: worker count and request budget from the job count and platform
//! 3. **Execution**: the worker pool drains the jobs under the per-platform rate limit
//! 4. **Aggregation**: results, overrides and fallbacks merge into one target per record
//!
//! # Example
//!
//! ```rust,ignore
//! use scm_enrich::pipeline::{EnrichConfig, EnrichmentPipeline};
//! use scm_enrich::records::SourceType;
//!
//! let config = EnrichConfig::from_yaml_file("enrich.yaml")?.with_env()?;
//! let pipeline = EnrichmentPipeline::from_config(config)?;
//!
//! let outcome = pipeline.run(&records, SourceType::Github).await?;
//! for target in &outcome.report.targets {
//!     println!("{} -> {:?}", target.repository_url, target.branch);
//! }
//! ```

pub mod config;
pub mod runner;

pub use config::{ConfigError, EnrichConfig};
pub use runner::{EnrichmentPipeline, RunOutcome};
