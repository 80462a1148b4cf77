//! Configuration for an enrichment run.
//!
//! Values are layered, lowest precedence first: built-in defaults, an
//! optional YAML file, environment variables, then command-line flags
//! (applied by the CLI through the builder methods).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::records::{FieldOverrides, DEFAULT_EXCLUSION_GLOBS};
use crate::scheduler::RetryPolicy;
use crate::scm::{ApiBaseOverrides, ScmCredentials};
use crate::tuning::TuningOverrides;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The YAML file could not be parsed.
    #[error("Invalid configuration file '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

const DEFAULT_FALLBACK_BRANCH: &str = "main";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Everything an enrichment run needs besides its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Retry and backoff settings.
    pub retry: RetryPolicy,
    /// Fixed worker count or request rate; unset fields are auto-tuned.
    pub tuning: TuningOverrides,
    /// Field overrides applied to every record.
    pub overrides: FieldOverrides,
    /// Branch used when the repository or its default branch is not found.
    pub fallback_branch: String,
    /// Exclusion globs used when no override is given.
    pub default_exclusion_globs: String,
    /// Timeout for a single HTTP request.
    pub request_timeout_secs: u64,
    /// Cancels the run after this many seconds.
    pub run_timeout_secs: Option<u64>,
    pub credentials: ScmCredentials,
    pub api_bases: ApiBaseOverrides,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            tuning: TuningOverrides::default(),
            overrides: FieldOverrides::default(),
            fallback_branch: DEFAULT_FALLBACK_BRANCH.to_string(),
            default_exclusion_globs: DEFAULT_EXCLUSION_GLOBS.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            run_timeout_secs: None,
            credentials: ScmCredentials::default(),
            api_bases: ApiBaseOverrides::default(),
        }
    }
}

impl EnrichConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a YAML file; missing keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.display().to_string(),
            source,
        })
    }

    /// Applies the process environment on top of this configuration.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Applies environment values from `lookup` on top of this configuration.
    ///
    /// # Environment Variables
    ///
    /// - `GITHUB_TOKEN`, `GITLAB_TOKEN`, `AZURE_DEVOPS_TOKEN`: platform credentials
    /// - `ENRICH_MAX_ATTEMPTS`: attempts per lookup, first included (default: 3)
    /// - `ENRICH_BASE_DELAY_MS`: first retry delay (default: 1000)
    /// - `ENRICH_MAX_JITTER_MS`: jitter bound (default: 250)
    /// - `ENRICH_MAX_DELAY_MS`: backoff cap (default: 60000)
    /// - `ENRICH_FALLBACK_BRANCH`: branch for not-found repositories (default: main)
    /// - `ENRICH_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 10)
    /// - `ENRICH_RUN_TIMEOUT_SECS`: whole-run timeout (default: none)
    pub fn with_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = var("GITHUB_TOKEN") {
            self.credentials.github_token = Some(token);
        }
        if let Some(token) = var("GITLAB_TOKEN") {
            self.credentials.gitlab_token = Some(token);
        }
        if let Some(token) = var("AZURE_DEVOPS_TOKEN") {
            self.credentials.azure_token = Some(token);
        }

        if let Some(val) = var("ENRICH_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env_value(&val, "ENRICH_MAX_ATTEMPTS")?;
        }
        if let Some(val) = var("ENRICH_BASE_DELAY_MS") {
            self.retry.base_delay_ms = parse_env_value(&val, "ENRICH_BASE_DELAY_MS")?;
        }
        if let Some(val) = var("ENRICH_MAX_JITTER_MS") {
            self.retry.max_jitter_ms = parse_env_value(&val, "ENRICH_MAX_JITTER_MS")?;
        }
        if let Some(val) = var("ENRICH_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_env_value(&val, "ENRICH_MAX_DELAY_MS")?;
        }

        if let Some(val) = var("ENRICH_FALLBACK_BRANCH") {
            self.fallback_branch = val.trim().to_string();
        }
        if let Some(val) = var("ENRICH_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env_value(&val, "ENRICH_REQUEST_TIMEOUT_SECS")?;
        }
        if let Some(val) = var("ENRICH_RUN_TIMEOUT_SECS") {
            self.run_timeout_secs = Some(parse_env_value(&val, "ENRICH_RUN_TIMEOUT_SECS")?);
        }

        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.tuning.worker_count == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "worker_count override must be greater than 0".to_string(),
            ));
        }

        if self.tuning.requests_per_minute == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "requests_per_minute override must be greater than 0".to_string(),
            ));
        }

        if self.fallback_branch.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "fallback_branch cannot be empty".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.run_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "run_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Builder method to set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder method to set tuning overrides.
    pub fn with_tuning(mut self, tuning: TuningOverrides) -> Self {
        self.tuning = tuning;
        self
    }

    /// Builder method to set field overrides.
    pub fn with_overrides(mut self, overrides: FieldOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Builder method to set the fallback branch.
    pub fn with_fallback_branch(mut self, branch: impl Into<String>) -> Self {
        self.fallback_branch = branch.into();
        self
    }

    /// Builder method to set the run timeout.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Builder method to set credentials.
    pub fn with_credentials(mut self, credentials: ScmCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Builder method to set API base overrides.
    pub fn with_api_bases(mut self, api_bases: ApiBaseOverrides) -> Self {
        self.api_bases = api_bases;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = EnrichConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.fallback_branch, "main");
        assert_eq!(config.default_exclusion_globs, DEFAULT_EXCLUSION_GLOBS);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.run_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_layer() {
        let config = EnrichConfig::default()
            .with_env_from(env(&[
                ("GITHUB_TOKEN", "ghp_x"),
                ("AZURE_DEVOPS_TOKEN", "  "),
                ("ENRICH_MAX_ATTEMPTS", "5"),
                ("ENRICH_BASE_DELAY_MS", "200"),
                ("ENRICH_FALLBACK_BRANCH", "master"),
                ("ENRICH_RUN_TIMEOUT_SECS", "600"),
            ]))
            .expect("env");

        assert_eq!(config.credentials.github_token.as_deref(), Some("ghp_x"));
        assert_eq!(config.credentials.azure_token, None);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.retry.max_jitter_ms, 250);
        assert_eq!(config.fallback_branch, "master");
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_env_invalid_number() {
        let err = EnrichConfig::default()
            .with_env_from(env(&[("ENRICH_MAX_ATTEMPTS", "three")]))
            .unwrap_err();
        assert!(err.to_string().contains("ENRICH_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_yaml_then_env_precedence() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "retry:\n  max_attempts: 4\n  base_delay_ms: 500\nfallback_branch: develop\ntuning:\n  worker_count: 6\napi_bases:\n  gitlab: https://gitlab.internal/api/v4"
        )
        .expect("write");

        let config = EnrichConfig::from_yaml_file(file.path())
            .expect("yaml")
            .with_env_from(env(&[("ENRICH_MAX_ATTEMPTS", "2")]))
            .expect("env");

        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.retry.max_delay_ms, 60_000);
        assert_eq!(config.fallback_branch, "develop");
        assert_eq!(config.tuning.worker_count, Some(6));
        assert_eq!(
            config.api_bases.gitlab.as_deref(),
            Some("https://gitlab.internal/api/v4")
        );
        assert_eq!(config.default_exclusion_globs, DEFAULT_EXCLUSION_GLOBS);
    }

    #[test]
    fn test_yaml_invalid() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "retry: [not, a, map]").expect("write");
        let err = EnrichConfig::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }

    #[test]
    fn test_validation_zero_attempts() {
        let config =
            EnrichConfig::default().with_retry(RetryPolicy::default().with_max_attempts(0));
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_attempts"));
    }

    #[test]
    fn test_validation_zero_overrides() {
        let workers = EnrichConfig::default().with_tuning(TuningOverrides {
            worker_count: Some(0),
            requests_per_minute: None,
        });
        assert!(workers
            .validate()
            .unwrap_err()
            .to_string()
            .contains("worker_count"));

        let rate = EnrichConfig::default().with_tuning(TuningOverrides {
            worker_count: None,
            requests_per_minute: Some(0),
        });
        assert!(rate
            .validate()
            .unwrap_err()
            .to_string()
            .contains("requests_per_minute"));
    }

    #[test]
    fn test_validation_empty_fallback_branch() {
        let config = EnrichConfig::default().with_fallback_branch(" ");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("fallback_branch"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "KEY".to_string(),
            message: "bad value".to_string(),
        };
        assert!(err.to_string().contains("KEY"));
        assert!(err.to_string().contains("bad value"));

        let err = ConfigError::ValidationFailed("test failure".to_string());
        assert!(err.to_string().contains("test failure"));
    }
}
