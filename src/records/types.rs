//! Input record and override types.

use serde::{Deserialize, Serialize};

use crate::error::SelectionError;

/// Exclusion globs applied when the caller does not override them.
pub const DEFAULT_EXCLUSION_GLOBS: &str = "fixtures, tests, __tests__, node_modules";

/// Organisation markers meaning "not imported anywhere yet".
const NOT_IMPORTED_MARKERS: &[&str] = &["", "n/a", "nan"];

/// A repository to import, as handed over by the input collaborator.
///
/// Records are immutable once a run starts. Their identity is their
/// position in the input sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Application the repository belongs to; maps to an organisation.
    #[serde(alias = "Application")]
    pub application_name: String,
    /// Clone or browse URL of the repository.
    #[serde(alias = "Repository URL")]
    pub repository_url: String,
    /// Free-form source label declared upstream (e.g. "GitHub", "Azure DevOps").
    #[serde(default, alias = "asset_source", alias = "Asset Source")]
    pub source_label: String,
    /// Organisations the repository is already imported into, if any.
    #[serde(default, alias = "Organizations")]
    pub organizations: Option<String>,
}

impl RepositoryRecord {
    /// Creates a record with no organisation marker.
    pub fn new(
        application_name: impl Into<String>,
        repository_url: impl Into<String>,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            application_name: application_name.into(),
            repository_url: repository_url.into(),
            source_label: source_label.into(),
            organizations: None,
        }
    }

    /// Sets the existing-organisation marker.
    pub fn with_organizations(mut self, organizations: impl Into<String>) -> Self {
        self.organizations = Some(organizations.into());
        self
    }

    /// Returns whether the record has not been imported into any organisation.
    pub fn is_not_imported(&self) -> bool {
        let marker = self
            .organizations
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        NOT_IMPORTED_MARKERS.contains(&marker.as_str())
    }

    /// Repository URL with surrounding whitespace removed.
    pub fn url(&self) -> &str {
        self.repository_url.trim()
    }

    /// Checks the invariants the core relies on.
    pub fn validate(&self, ordinal: usize) -> Result<(), SelectionError> {
        if self.application_name.trim().is_empty() {
            return Err(SelectionError::EmptyApplicationName { ordinal });
        }
        Ok(())
    }
}

/// Caller-supplied values that replace looked-up or default fields.
///
/// An overridden field is never looked up over the network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOverrides {
    /// Branch used for every repository.
    #[serde(default)]
    pub branch: Option<String>,
    /// Comma-separated file paths to scan.
    #[serde(default)]
    pub files: Option<String>,
    /// Exclusion globs; an empty string means "no exclusions".
    #[serde(default)]
    pub exclusion_globs: Option<String>,
}

impl FieldOverrides {
    /// Sets the branch override.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Sets the files override.
    pub fn with_files(mut self, files: impl Into<String>) -> Self {
        self.files = Some(files.into());
        self
    }

    /// Sets the exclusion globs override.
    pub fn with_exclusion_globs(mut self, globs: impl Into<String>) -> Self {
        self.exclusion_globs = Some(globs.into());
        self
    }

    /// Non-empty branch override, if any.
    pub fn branch(&self) -> Option<&str> {
        self.branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    /// File paths from the comma-separated override.
    pub fn file_paths(&self) -> Vec<String> {
        self.files
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Exclusion globs to apply; the override wins even when empty.
    pub fn exclusion_globs_or(&self, default: &str) -> String {
        self.exclusion_globs
            .clone()
            .unwrap_or_else(|| default.to_string())
    }
}
