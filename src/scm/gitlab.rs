//! GitLab client (GitLab.com and self-managed).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::http::{read_json, send};
use super::types::{MetadataRequest, PlatformIdentifier, RepoMetadata, ScmError, ScmResult};
use super::url::GitLabProject;
use super::{normalize_base, ScmClient};
use crate::records::ScmPlatform;

/// Subset of `GET /projects/:id`.
///
/// `default_branch` is null for projects without commits.
#[derive(Debug, Deserialize)]
struct ProjectResponse {
    id: u64,
    #[serde(default)]
    default_branch: Option<String>,
}

/// Looks up projects through the GitLab REST API (v4).
///
/// Import targets for GitLab address projects by numeric id, so this client
/// requires an identifier and answers both fields from one request.
pub struct GitLabClient {
    http_client: Client,
    api_token: Option<String>,
    api_base: Option<String>,
}

impl GitLabClient {
    pub fn new(http_client: Client, api_token: Option<String>) -> Self {
        Self {
            http_client,
            api_token,
            api_base: None,
        }
    }

    /// Sends every request to `base` instead of `https://{host}/api/v4`.
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = Some(normalize_base(base));
        self
    }

    async fn fetch_project(&self, repository_url: &str) -> ScmResult<(String, ProjectResponse)> {
        let project = GitLabProject::parse(repository_url)?;
        let base = self.api_base.clone().unwrap_or_else(|| project.api_base());
        let url = format!("{}/projects/{}", base, project.encoded_path());

        let mut request = self.http_client.get(&url);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let context = format!("GitLab {}", project.path);
        let response = send(request, &context).await?;
        let body = read_json(response, &context).await?;
        Ok((context, body))
    }
}

fn non_empty(branch: Option<String>) -> Option<String> {
    branch.filter(|b| !b.trim().is_empty())
}

#[async_trait]
impl ScmClient for GitLabClient {
    fn platform(&self) -> ScmPlatform {
        ScmPlatform::GitLab
    }

    fn requires_identifier(&self) -> bool {
        true
    }

    async fn fetch_default_branch(&self, repository_url: &str) -> ScmResult<String> {
        let (context, project) = self.fetch_project(repository_url).await?;
        non_empty(project.default_branch)
            .ok_or_else(|| ScmError::NotFound(format!("{context}: project has no default branch")))
    }

    async fn fetch_platform_identifier(
        &self,
        repository_url: &str,
    ) -> ScmResult<PlatformIdentifier> {
        let (_, project) = self.fetch_project(repository_url).await?;
        Ok(PlatformIdentifier::Id(project.id.to_string()))
    }

    async fn fetch_metadata(
        &self,
        repository_url: &str,
        request: MetadataRequest,
    ) -> ScmResult<RepoMetadata> {
        if request.is_empty() {
            return Ok(RepoMetadata::default());
        }
        let (_, project) = self.fetch_project(repository_url).await?;
        // An empty project keeps its id; the missing branch falls back downstream.
        Ok(RepoMetadata {
            default_branch: if request.branch {
                non_empty(project.default_branch)
            } else {
                None
            },
            identifier: if request.identifier {
                PlatformIdentifier::Id(project.id.to_string())
            } else {
                PlatformIdentifier::NotApplicable
            },
        })
    }
}
