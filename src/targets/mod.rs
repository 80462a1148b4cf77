//! Organisation directory and Snyk import-target rendering.
//!
//! The directory maps application names to organisations and lists each
//! organisation's integrations. Rendering turns an [`EnrichmentReport`]
//! into the `{"targets": [...]}` document consumed by the Snyk import API.
//! Targets that cannot be rendered are returned as [`SkippedTarget`]s so the
//! caller can report them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::aggregate::{EnrichmentReport, ImportTarget};
use crate::error::TargetsError;
use crate::records::{ScmPlatform, SourceType};
use crate::scm::RepoCoordinates;

/// One organisation from the directory file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    /// Integration type → integration id.
    #[serde(default)]
    pub integrations: HashMap<String, String>,
}

impl Organization {
    /// Integration id for a source type, if the organisation has one.
    pub fn integration_id(&self, source_type: SourceType) -> Option<&str> {
        self.integrations
            .get(source_type.as_str())
            .map(String::as_str)
            .filter(|id| !id.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct OrgFile {
    #[serde(rename = "orgData", default)]
    org_data: Vec<Organization>,
}

/// Organisations keyed by the application they were created for.
#[derive(Debug, Clone, Default)]
pub struct OrgDirectory {
    by_name: HashMap<String, Organization>,
}

impl OrgDirectory {
    /// Loads the directory from an `{"orgData": [...]}` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TargetsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| TargetsError::ReadOrgs {
            path: path.display().to_string(),
            source,
        })?;
        let directory = Self::from_json(&content).map_err(|source| TargetsError::ParseOrgs {
            path: path.display().to_string(),
            source,
        })?;
        info!(
            organizations = directory.len(),
            path = %path.display(),
            "Loaded organisation directory"
        );
        Ok(directory)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let file: OrgFile = serde_json::from_str(content)?;
        Ok(Self::from_organizations(file.org_data))
    }

    pub fn from_organizations(orgs: impl IntoIterator<Item = Organization>) -> Self {
        let by_name = orgs
            .into_iter()
            .map(|org| (org.name.trim().to_string(), org))
            .collect();
        Self { by_name }
    }

    /// Organisation created for an application.
    pub fn for_application(&self, application_name: &str) -> Option<&Organization> {
        self.by_name.get(application_name.trim())
    }

    /// Names of every application with an organisation.
    pub fn application_names(&self) -> HashSet<String> {
        self.by_name.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Project id as sent to Snyk: numeric when the platform id is all digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectId {
    Numeric(u64),
    Text(String),
}

impl ProjectId {
    fn parse(id: &str) -> Self {
        id.parse::<u64>()
            .map(ProjectId::Numeric)
            .unwrap_or_else(|_| ProjectId::Text(id.to_string()))
    }
}

/// Where Snyk finds the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetLocator {
    /// Platforms addressed by project id (GitLab).
    Project {
        id: ProjectId,
        #[serde(skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
    /// Platforms addressed by owner and name.
    Repository {
        owner: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub path: String,
}

/// One entry of the import-targets document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnykTarget {
    pub org_id: String,
    pub integration_id: String,
    pub target: TargetLocator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileRef>,
    pub exclusion_globs: String,
}

/// The `{"targets": [...]}` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsFile {
    pub targets: Vec<SnykTarget>,
}

/// Why a target was left out of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    NoOrganization,
    NoIntegration { source: String },
    MissingProjectId,
    InvalidUrl { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTarget {
    pub ordinal: usize,
    pub application_name: String,
    pub repository_url: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Rendering output: the document plus everything left out of it.
#[derive(Debug, Clone, Default)]
pub struct RenderedTargets {
    pub file: TargetsFile,
    pub skipped: Vec<SkippedTarget>,
}

impl RenderedTargets {
    /// Target counts per organisation name, sorted by name.
    pub fn counts_by_org(&self, directory: &OrgDirectory) -> BTreeMap<String, usize> {
        let names: HashMap<&str, &str> = directory
            .by_name
            .values()
            .map(|org| (org.id.as_str(), org.name.as_str()))
            .collect();
        let mut counts = BTreeMap::new();
        for target in &self.file.targets {
            let name = names
                .get(target.org_id.as_str())
                .copied()
                .unwrap_or(target.org_id.as_str());
            *counts.entry(name.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// Renders every target of the report that can be imported.
pub fn render_targets(
    report: &EnrichmentReport,
    directory: &OrgDirectory,
    source_type: SourceType,
) -> RenderedTargets {
    let mut rendered = RenderedTargets::default();

    for target in &report.targets {
        match render_one(target, directory, source_type) {
            Ok(snyk) => rendered.file.targets.push(snyk),
            Err(reason) => {
                warn!(
                    ordinal = target.ordinal,
                    application = %target.application_name,
                    url = %target.repository_url,
                    reason = ?reason,
                    "Skipping import target"
                );
                rendered.skipped.push(SkippedTarget {
                    ordinal: target.ordinal,
                    application_name: target.application_name.clone(),
                    repository_url: target.repository_url.clone(),
                    reason,
                });
            }
        }
    }

    rendered
}

fn render_one(
    target: &ImportTarget,
    directory: &OrgDirectory,
    source_type: SourceType,
) -> Result<SnykTarget, SkipReason> {
    let org = directory
        .for_application(&target.application_name)
        .ok_or(SkipReason::NoOrganization)?;
    let integration_id = org
        .integration_id(source_type)
        .ok_or_else(|| SkipReason::NoIntegration {
            source: source_type.as_str().to_string(),
        })?;

    let branch = target.branch.clone();
    let locator = if source_type.platform() == ScmPlatform::GitLab {
        let id = target
            .identifier
            .as_deref()
            .ok_or(SkipReason::MissingProjectId)?;
        TargetLocator::Project {
            id: ProjectId::parse(id),
            branch,
        }
    } else {
        let coords = RepoCoordinates::from_url(&target.repository_url).map_err(|e| {
            SkipReason::InvalidUrl {
                message: e.to_string(),
            }
        })?;
        TargetLocator::Repository {
            owner: coords.owner,
            name: coords.name,
            branch,
        }
    };

    Ok(SnykTarget {
        org_id: org.id.clone(),
        integration_id: integration_id.to_string(),
        target: locator,
        files: target
            .files
            .iter()
            .map(|path| FileRef { path: path.clone() })
            .collect(),
        exclusion_globs: target.exclusion_globs.clone(),
    })
}

/// Writes any serializable document as pretty-printed JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), TargetsError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    info!(path = %path.display(), "Wrote file");
    Ok(())
}
