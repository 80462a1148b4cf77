//! scm-enrich CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for command handling.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first to get log_level and log_dir
    let cli = scm_enrich::cli::parse_cli();

    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let log_file = scm_enrich::logging::init_logging(
        &cli.log_level,
        cli.log_dir.as_deref(),
        cli.command_name(),
    )?;
    if let Some(path) = log_file {
        tracing::info!(path = %path.display(), "Logging to file");
    }

    scm_enrich::cli::run_with_cli(cli).await
}
