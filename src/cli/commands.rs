//! CLI command definitions for scm-enrich.
//!
//! - `enrich`: select records, look up their SCM metadata and write Snyk import targets
//! - `tune`: print the auto-tuning decision for a job count and source type

use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::FailureSummary;
use crate::metrics::{export_metrics, init_metrics};
use crate::pipeline::{EnrichConfig, EnrichmentPipeline};
use crate::records::{
    select_records, FieldOverrides, RepositoryRecord, RowSelection, SelectionOptions, SourceType,
};
use crate::scheduler::CancelReason;
use crate::targets::{render_targets, write_json, OrgDirectory, SkippedTarget};
use crate::tuning::{tune, TuningConfig, TuningOverrides};

/// Default output file for import targets.
const DEFAULT_OUTPUT: &str = "import-targets.json";

/// Enrich repository records with SCM metadata and build Snyk import targets.
#[derive(Parser)]
#[command(name = "scm-enrich")]
#[command(about = "Enrich repository records with SCM metadata and build Snyk import targets")]
#[command(version)]
#[command(
    long_about = "scm-enrich looks up default branches and project ids for a batch of repositories\nacross GitHub, GitLab and Azure DevOps, under per-platform rate limits, and writes\nSnyk import targets.\n\nExample usage:\n  scm-enrich enrich --records repos.json --orgs-json snyk-created-orgs.json --source github"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Directory for log files; console only when unset.
    #[arg(long, env = "SNYK_LOG_PATH", global = true)]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    /// Short name of the selected command, used for log file names.
    pub fn command_name(&self) -> &'static str {
        match self.command {
            Commands::Enrich(_) => "enrich",
            Commands::Tune(_) => "tune",
        }
    }
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Look up repository metadata and write import targets.
    Enrich(Box<EnrichArgs>),

    /// Print the tuning decision for a job count.
    Tune(TuneArgs),
}

/// Arguments for `scm-enrich enrich`.
#[derive(Parser, Debug)]
pub struct EnrichArgs {
    /// JSON array of repository records.
    #[arg(long)]
    pub records: PathBuf,

    /// Organisation directory (`{"orgData": [...]}`).
    #[arg(long)]
    pub orgs_json: PathBuf,

    /// Integration type: github, github-cloud-app, github-enterprise, gitlab or azure-repos.
    #[arg(long)]
    pub source: SourceType,

    /// Output file for import targets.
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Also write the run report (summary, skipped targets) to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// 1-based rows to process, e.g. "2,5-8,10".
    #[arg(long)]
    pub rows: Option<String>,

    /// Process at most this many records after filtering.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Only records not yet imported into any organisation.
    #[arg(long)]
    pub empty_org_only: bool,

    /// Branch for every repository; skips branch lookups.
    #[arg(long)]
    pub branch: Option<String>,

    /// Comma-separated files to scan.
    #[arg(long)]
    pub files: Option<String>,

    /// Exclusion globs; an empty string disables exclusions.
    #[arg(long)]
    pub exclusion_globs: Option<String>,

    /// Fixed number of workers.
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Fixed request budget per minute.
    #[arg(long)]
    pub rate_limit: Option<u32>,

    /// Attempts per lookup, first included.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// First retry delay in milliseconds.
    #[arg(long)]
    pub base_delay_ms: Option<u64>,

    /// Upper bound of the random jitter in milliseconds.
    #[arg(long)]
    pub max_jitter_ms: Option<u64>,

    /// Branch used when a repository is not found.
    #[arg(long)]
    pub fallback_branch: Option<String>,

    /// Cancel the run after this many seconds.
    #[arg(long)]
    pub run_timeout_secs: Option<u64>,

    /// YAML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write Prometheus metrics to this file after the run.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

/// Arguments for `scm-enrich tune`.
#[derive(Parser, Debug)]
pub struct TuneArgs {
    /// Number of repositories to enrich.
    #[arg(short = 'n', long)]
    pub count: usize,

    /// Integration type.
    #[arg(long)]
    pub source: SourceType,

    /// Fixed number of workers.
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Fixed request budget per minute.
    #[arg(long)]
    pub rate_limit: Option<u32>,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Enrich(args) => run_enrich_command(*args).await,
        Commands::Tune(args) => run_tune_command(args),
    }
}

// ============================================================================
// Enrich Command Implementation
// ============================================================================

/// Written to `--report`.
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    run_id: Uuid,
    source: SourceType,
    tuning: &'a TuningConfig,
    targets_written: usize,
    summary: &'a FailureSummary,
    skipped: &'a [SkippedTarget],
}

/// Layers CLI flags over the file and environment configuration.
fn build_config(args: &EnrichArgs) -> anyhow::Result<EnrichConfig> {
    let base = match &args.config {
        Some(path) => EnrichConfig::from_yaml_file(path)?,
        None => EnrichConfig::default(),
    };
    let mut config = base.with_env()?;

    if let Some(n) = args.max_workers {
        config.tuning.worker_count = Some(n);
    }
    if let Some(rpm) = args.rate_limit {
        config.tuning.requests_per_minute = Some(rpm);
    }
    if let Some(n) = args.max_attempts {
        config.retry.max_attempts = n;
    }
    if let Some(ms) = args.base_delay_ms {
        config.retry.base_delay_ms = ms;
    }
    if let Some(ms) = args.max_jitter_ms {
        config.retry.max_jitter_ms = ms;
    }
    if let Some(branch) = &args.fallback_branch {
        config.fallback_branch = branch.trim().to_string();
    }
    if let Some(secs) = args.run_timeout_secs {
        config = config.with_run_timeout(Duration::from_secs(secs));
    }
    if args.branch.is_some() || args.files.is_some() || args.exclusion_globs.is_some() {
        config.overrides = FieldOverrides {
            branch: args.branch.clone().or(config.overrides.branch),
            files: args.files.clone().or(config.overrides.files),
            exclusion_globs: args
                .exclusion_globs
                .clone()
                .or(config.overrides.exclusion_globs),
        };
    }

    config.validate()?;
    Ok(config)
}

fn read_records(path: &Path) -> anyhow::Result<Vec<RepositoryRecord>> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read records file {}: {}", path.display(), e))?;
    let records: Vec<RepositoryRecord> = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid records file {}: {}", path.display(), e))?;
    info!(records = records.len(), path = %path.display(), "Loaded repository records");
    Ok(records)
}

fn log_summary(summary: &FailureSummary) {
    if summary.has_failures() || !summary.complete {
        warn!(
            total = summary.total,
            enriched = summary.enriched,
            overridden = summary.overridden,
            fallback = summary.fallback,
            failed = summary.failed,
            unattempted = summary.unattempted,
            complete = summary.complete,
            "Enrichment finished with failures"
        );
        for (kind, count) in &summary.counts_by_kind {
            warn!(kind = %kind, count, "Failed lookups");
        }
        for failure in &summary.failures {
            warn!(
                ordinal = failure.ordinal,
                url = %failure.repository_url,
                kind = %failure.kind,
                "Lookup failed"
            );
        }
    } else {
        info!(
            total = summary.total,
            enriched = summary.enriched,
            overridden = summary.overridden,
            fallback = summary.fallback,
            "Enrichment finished"
        );
    }
}

async fn run_enrich_command(args: EnrichArgs) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    let directory = OrgDirectory::load(&args.orgs_json)?;

    let mut options = SelectionOptions::new(args.source).with_empty_org_only(args.empty_org_only);
    if let Some(rows) = &args.rows {
        options = options.with_rows(RowSelection::parse(rows)?);
    }
    if let Some(limit) = args.limit {
        options = options.with_limit(limit);
    }
    let records = select_records(
        read_records(&args.records)?,
        &options,
        Some(&directory.application_names()),
    )?;
    if records.is_empty() {
        warn!(source = %args.source, "No records left after filtering, nothing to do");
        return Ok(());
    }

    if let Err(e) = init_metrics() {
        warn!(error = %e, "Metrics registry unavailable");
    }

    let pipeline = EnrichmentPipeline::from_config(config)?;
    let cancel = pipeline.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && cancel.cancel(CancelReason::Aborted) {
            warn!("Interrupted, finishing in-flight lookups");
        }
    });
    let outcome = pipeline.run(&records, args.source).await;
    interrupt.abort();
    let outcome = outcome?;

    let rendered = render_targets(&outcome.report, &directory, args.source);
    write_json(&args.output, &rendered.file)?;
    info!(
        targets = rendered.file.targets.len(),
        skipped = rendered.skipped.len(),
        output = %args.output.display(),
        "Import targets written"
    );
    for (org, count) in rendered.counts_by_org(&directory) {
        info!(organization = %org, targets = count, "Targets by organisation");
    }

    let summary = &outcome.report.summary;
    log_summary(summary);

    if let Some(path) = &args.report {
        let report = RunReport {
            run_id: outcome.run_id,
            source: args.source,
            tuning: &outcome.tuning,
            targets_written: rendered.file.targets.len(),
            summary,
            skipped: &rendered.skipped,
        };
        write_json(path, &report)?;
    }

    if let Some(path) = &args.metrics_out {
        fs::write(path, export_metrics())?;
        info!(path = %path.display(), "Metrics written");
    }

    if summary.cancelled_by_auth() {
        let reason = summary
            .cancel_reason
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        anyhow::bail!(
            "Run cancelled: {} ({} lookups not attempted)",
            reason,
            summary.unattempted
        );
    }
    Ok(())
}

// ============================================================================
// Tune Command Implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct TuneOutput {
    count: usize,
    source: SourceType,
    #[serde(flatten)]
    tuning: TuningConfig,
    request_interval_secs: f64,
}

fn run_tune_command(args: TuneArgs) -> anyhow::Result<()> {
    let overrides = TuningOverrides {
        worker_count: args.max_workers,
        requests_per_minute: args.rate_limit,
    };
    let tuning = tune(args.count, args.source.platform(), &overrides);
    let output = TuneOutput {
        count: args.count,
        source: args.source,
        tuning,
        request_interval_secs: tuning.request_interval_secs(),
    };

    let json_output = serde_json::to_string_pretty(&output)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
    println!("{}", json_output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("valid arguments")
    }

    #[test]
    fn test_parse_enrich_args() {
        let cli = parse(&[
            "scm-enrich",
            "enrich",
            "--records",
            "repos.json",
            "--orgs-json",
            "orgs.json",
            "--source",
            "gitlab",
            "--rows",
            "2,5-8",
            "--max-workers",
            "4",
            "--exclusion-globs",
            "",
        ]);
        assert_eq!(cli.command_name(), "enrich");
        let Commands::Enrich(args) = cli.command else {
            panic!("expected enrich");
        };
        assert_eq!(args.source, SourceType::Gitlab);
        assert_eq!(args.output, PathBuf::from(DEFAULT_OUTPUT));
        assert_eq!(args.rows.as_deref(), Some("2,5-8"));
        assert_eq!(args.max_workers, Some(4));
        assert_eq!(args.exclusion_globs.as_deref(), Some(""));
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let result = Cli::try_parse_from([
            "scm-enrich",
            "enrich",
            "--records",
            "r.json",
            "--orgs-json",
            "o.json",
            "--source",
            "bitbucket",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_flags_override_config() {
        let cli = parse(&[
            "scm-enrich",
            "enrich",
            "--records",
            "r.json",
            "--orgs-json",
            "o.json",
            "--source",
            "github",
            "--branch",
            "release",
            "--max-attempts",
            "5",
            "--rate-limit",
            "30",
            "--fallback-branch",
            "master",
        ]);
        let Commands::Enrich(args) = cli.command else {
            panic!("expected enrich");
        };

        let config = build_config(&args).expect("config");
        assert_eq!(config.overrides.branch.as_deref(), Some("release"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.tuning.requests_per_minute, Some(30));
        assert_eq!(config.fallback_branch, "master");
    }

    #[test]
    fn test_parse_tune_args() {
        let cli = parse(&["scm-enrich", "tune", "--count", "150", "--source", "github"]);
        assert_eq!(cli.command_name(), "tune");
        let Commands::Tune(args) = cli.command else {
            panic!("expected tune");
        };
        assert_eq!(args.count, 150);
        assert!(run_tune_command(args).is_ok());
    }
}
