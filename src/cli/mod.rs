//! Command-line interface for scm-enrich.
//!
//! Provides the `enrich` and `tune` commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
