//! Integration types and SCM platform detection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::types::RepositoryRecord;
use crate::error::SelectionError;

/// SCM platform served by one client variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScmPlatform {
    GitHub,
    GitLab,
    AzureDevOps,
}

impl ScmPlatform {
    /// All platforms with a client variant.
    pub const ALL: [ScmPlatform; 3] = [
        ScmPlatform::GitHub,
        ScmPlatform::GitLab,
        ScmPlatform::AzureDevOps,
    ];

    /// Stable lowercase name, used for metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ScmPlatform::GitHub => "github",
            ScmPlatform::GitLab => "gitlab",
            ScmPlatform::AzureDevOps => "azure_devops",
        }
    }

    fn url_patterns(self) -> &'static [&'static str] {
        match self {
            ScmPlatform::GitHub => &["github.com", "github."],
            ScmPlatform::GitLab => &["gitlab.com", "gitlab."],
            ScmPlatform::AzureDevOps => &["dev.azure.com", "visualstudio.com"],
        }
    }

    fn label_keywords(self) -> &'static [&'static str] {
        match self {
            ScmPlatform::GitHub => &["github"],
            ScmPlatform::GitLab => &["gitlab"],
            ScmPlatform::AzureDevOps => &["azure", "devops"],
        }
    }

    /// Resolves the platform of a repository from its URL, then its label.
    ///
    /// Returns `None` when neither identifies a supported platform.
    pub fn detect(repository_url: &str, source_label: &str) -> Option<Self> {
        let url = repository_url.trim().to_lowercase();
        let label = source_label.trim().to_lowercase();

        Self::ALL
            .into_iter()
            .find(|p| p.url_patterns().iter().any(|pat| url.contains(pat)))
            .or_else(|| {
                Self::ALL
                    .into_iter()
                    .find(|p| p.label_keywords().iter().any(|kw| label.contains(kw)))
            })
    }

    /// Resolves the platform of a record.
    pub fn of_record(record: &RepositoryRecord) -> Option<Self> {
        Self::detect(&record.repository_url, &record.source_label)
    }
}

impl fmt::Display for ScmPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScmPlatform::GitHub => write!(f, "GitHub"),
            ScmPlatform::GitLab => write!(f, "GitLab"),
            ScmPlatform::AzureDevOps => write!(f, "Azure DevOps"),
        }
    }
}

/// Integration type selected for a run.
///
/// Names match the integration keys of the organisation directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Github,
    GithubCloudApp,
    GithubEnterprise,
    Gitlab,
    AzureRepos,
}

impl SourceType {
    /// The platform whose API serves this integration type.
    pub fn platform(self) -> ScmPlatform {
        match self {
            SourceType::Github | SourceType::GithubCloudApp | SourceType::GithubEnterprise => {
                ScmPlatform::GitHub
            }
            SourceType::Gitlab => ScmPlatform::GitLab,
            SourceType::AzureRepos => ScmPlatform::AzureDevOps,
        }
    }

    /// Integration key as stored in the organisation directory.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Github => "github",
            SourceType::GithubCloudApp => "github-cloud-app",
            SourceType::GithubEnterprise => "github-enterprise",
            SourceType::Gitlab => "gitlab",
            SourceType::AzureRepos => "azure-repos",
        }
    }

    fn url_patterns(self) -> &'static [&'static str] {
        match self {
            SourceType::Github | SourceType::GithubCloudApp => &["github.com"],
            SourceType::GithubEnterprise => &["github.com", "github."],
            SourceType::Gitlab => &["gitlab.com", "gitlab."],
            SourceType::AzureRepos => &["dev.azure.com", "visualstudio.com"],
        }
    }

    /// Returns whether a record belongs to this integration type.
    ///
    /// A record matches when its URL OR its source label matches.
    pub fn matches(self, record: &RepositoryRecord) -> bool {
        let url = record.repository_url.trim().to_lowercase();
        let label = record.source_label.trim().to_lowercase();

        let url_match = self.url_patterns().iter().any(|p| url.contains(p));
        let label_match = self
            .platform()
            .label_keywords()
            .iter()
            .any(|kw| label.contains(kw));

        url_match || label_match
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "github" => Ok(SourceType::Github),
            "github-cloud-app" => Ok(SourceType::GithubCloudApp),
            "github-enterprise" => Ok(SourceType::GithubEnterprise),
            "gitlab" => Ok(SourceType::Gitlab),
            "azure-repos" => Ok(SourceType::AzureRepos),
            other => Err(SelectionError::UnknownSourceType(other.to_string())),
        }
    }
}
