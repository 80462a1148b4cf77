//! Auto-tuning of worker count and request rate.
//!
//! `tune` is a pure function of (job count, platform, overrides). It reads
//! no process-wide state, so callers and tests can invoke it directly.
//!
//! Worker count follows a step table keyed by the number of jobs; the
//! request rate is a per-platform base chosen below the published API
//! ceiling. Both are monotonic non-decreasing in the job count.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::records::ScmPlatform;

/// GitHub REST allows 5000 requests/hour (~83/min) per token.
const GITHUB_BASE_RPM: u32 = 80;
/// GitLab.com allows 300 requests/minute per user.
const GITLAB_BASE_RPM: u32 = 250;
/// Azure DevOps publishes no hard ceiling; this stays well under its throttling.
const AZURE_BASE_RPM: u32 = 150;

/// Size tier selected from the job count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerTier {
    /// Up to 100 jobs.
    Small,
    /// 101 to 500 jobs.
    Medium,
    /// 501 to 2000 jobs.
    Large,
    /// 2001 to 5000 jobs.
    VeryLarge,
    /// More than 5000 jobs.
    Maximum,
}

impl WorkerTier {
    /// Step table: (inclusive upper bound, tier). Anything larger is `Maximum`.
    const STEPS: [(usize, WorkerTier); 4] = [
        (100, WorkerTier::Small),
        (500, WorkerTier::Medium),
        (2000, WorkerTier::Large),
        (5000, WorkerTier::VeryLarge),
    ];

    /// Selects the tier for a job count.
    pub fn for_job_count(job_count: usize) -> Self {
        Self::STEPS
            .iter()
            .find(|(bound, _)| job_count <= *bound)
            .map(|(_, tier)| *tier)
            .unwrap_or(WorkerTier::Maximum)
    }

    /// Number of concurrent workers for this tier.
    pub fn worker_count(self) -> usize {
        match self {
            WorkerTier::Small => 10,
            WorkerTier::Medium => 20,
            WorkerTier::Large => 30,
            WorkerTier::VeryLarge => 40,
            WorkerTier::Maximum => 50,
        }
    }
}

impl fmt::Display for WorkerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerTier::Small => "small",
            WorkerTier::Medium => "medium",
            WorkerTier::Large => "large",
            WorkerTier::VeryLarge => "very_large",
            WorkerTier::Maximum => "maximum",
        };
        f.write_str(name)
    }
}

/// Base request rate for a platform, in requests per minute.
pub fn base_requests_per_minute(platform: ScmPlatform) -> u32 {
    match platform {
        ScmPlatform::GitHub => GITHUB_BASE_RPM,
        ScmPlatform::GitLab => GITLAB_BASE_RPM,
        ScmPlatform::AzureDevOps => AZURE_BASE_RPM,
    }
}

/// Caller-supplied values that replace the computed ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningOverrides {
    /// Fixed number of workers.
    #[serde(default)]
    pub worker_count: Option<usize>,
    /// Fixed request rate, in requests per minute.
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

impl TuningOverrides {
    /// Returns whether any field is overridden.
    pub fn is_empty(&self) -> bool {
        self.worker_count.is_none() && self.requests_per_minute.is_none()
    }
}

/// Where a tuned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningOrigin {
    Auto,
    Override,
}

/// Concurrency and rate-limit settings for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Number of concurrent workers.
    pub worker_count: usize,
    /// Request budget per minute for the platform.
    pub requests_per_minute: u32,
    /// Tier the job count fell into.
    pub tier: WorkerTier,
    /// Whether `worker_count` was computed or overridden.
    pub worker_origin: TuningOrigin,
    /// Whether `requests_per_minute` was computed or overridden.
    pub rate_origin: TuningOrigin,
}

impl TuningConfig {
    /// Seconds between requests at a steady rate.
    pub fn request_interval_secs(&self) -> f64 {
        60.0 / f64::from(self.requests_per_minute.max(1))
    }
}

/// Derives the tuning for a run.
///
/// Any field present in `overrides` replaces the computed value.
pub fn tune(job_count: usize, platform: ScmPlatform, overrides: &TuningOverrides) -> TuningConfig {
    let tier = WorkerTier::for_job_count(job_count);

    let (worker_count, worker_origin) = match overrides.worker_count {
        Some(n) => (n, TuningOrigin::Override),
        None => (tier.worker_count(), TuningOrigin::Auto),
    };

    let (requests_per_minute, rate_origin) = match overrides.requests_per_minute {
        Some(rpm) => (rpm, TuningOrigin::Override),
        None => (base_requests_per_minute(platform), TuningOrigin::Auto),
    };

    TuningConfig {
        worker_count,
        requests_per_minute,
        tier,
        worker_origin,
        rate_origin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(WorkerTier::for_job_count(0), WorkerTier::Small);
        assert_eq!(WorkerTier::for_job_count(100), WorkerTier::Small);
        assert_eq!(WorkerTier::for_job_count(101), WorkerTier::Medium);
        assert_eq!(WorkerTier::for_job_count(500), WorkerTier::Medium);
        assert_eq!(WorkerTier::for_job_count(501), WorkerTier::Large);
        assert_eq!(WorkerTier::for_job_count(2000), WorkerTier::Large);
        assert_eq!(WorkerTier::for_job_count(5000), WorkerTier::VeryLarge);
        assert_eq!(WorkerTier::for_job_count(5001), WorkerTier::Maximum);
        assert_eq!(WorkerTier::for_job_count(250_000), WorkerTier::Maximum);
    }

    #[test]
    fn test_medium_github_run() {
        let config = tune(150, ScmPlatform::GitHub, &TuningOverrides::default());
        assert_eq!(config.tier, WorkerTier::Medium);
        assert_eq!(config.worker_count, WorkerTier::Medium.worker_count());
        assert_eq!(
            config.requests_per_minute,
            base_requests_per_minute(ScmPlatform::GitHub)
        );
        assert_eq!(config.worker_origin, TuningOrigin::Auto);
        assert_eq!(config.rate_origin, TuningOrigin::Auto);
    }

    #[test]
    fn test_monotonic_in_job_count() {
        let counts = [
            0, 1, 50, 100, 101, 499, 500, 501, 1000, 2000, 2001, 4999, 5000, 5001, 10_000,
            10_001, 50_000,
        ];
        for platform in ScmPlatform::ALL {
            let mut previous: Option<TuningConfig> = None;
            for &count in &counts {
                let config = tune(count, platform, &TuningOverrides::default());
                if let Some(prev) = previous {
                    assert!(
                        config.worker_count >= prev.worker_count,
                        "{platform}: workers dropped at {count}"
                    );
                    assert!(
                        config.requests_per_minute >= prev.requests_per_minute,
                        "{platform}: rate dropped at {count}"
                    );
                }
                previous = Some(config);
            }
        }
    }

    #[test]
    fn test_base_rates_are_distinct() {
        let gh = base_requests_per_minute(ScmPlatform::GitHub);
        let gl = base_requests_per_minute(ScmPlatform::GitLab);
        let az = base_requests_per_minute(ScmPlatform::AzureDevOps);
        assert!(gh != gl && gl != az && gh != az);
        assert!(gh < 83, "GitHub base rate must stay under 5000/hour");
        assert!(gl < 300, "GitLab base rate must stay under 300/min");
    }

    #[test]
    fn test_overrides_always_win() {
        let overrides = TuningOverrides {
            worker_count: Some(3),
            requests_per_minute: Some(7),
        };
        let config = tune(9000, ScmPlatform::GitLab, &overrides);
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.requests_per_minute, 7);
        assert_eq!(config.tier, WorkerTier::Maximum);
        assert_eq!(config.worker_origin, TuningOrigin::Override);
        assert_eq!(config.rate_origin, TuningOrigin::Override);
    }

    #[test]
    fn test_partial_override() {
        let overrides = TuningOverrides {
            worker_count: None,
            requests_per_minute: Some(30),
        };
        let config = tune(10, ScmPlatform::AzureDevOps, &overrides);
        assert_eq!(config.worker_count, 10);
        assert_eq!(config.worker_origin, TuningOrigin::Auto);
        assert_eq!(config.requests_per_minute, 30);
        assert!((config.request_interval_secs() - 2.0).abs() < f64::EPSILON);
    }
}
