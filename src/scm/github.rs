//! GitHub and GitHub Enterprise client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::http::{read_json, send};
use super::types::{PlatformIdentifier, ScmError, ScmResult};
use super::url::GitHubRepo;
use super::{normalize_base, ScmClient};
use crate::records::ScmPlatform;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Subset of `GET /repos/{owner}/{repo}`.
#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    default_branch: String,
}

/// Looks up repositories through the GitHub REST API.
pub struct GitHubClient {
    http_client: Client,
    api_token: Option<String>,
    /// Replaces the host-derived API root when set.
    api_base: Option<String>,
}

impl GitHubClient {
    /// Creates a client; without a token requests are heavily rate-limited.
    pub fn new(http_client: Client, api_token: Option<String>) -> Self {
        Self {
            http_client,
            api_token,
            api_base: None,
        }
    }

    /// Sends every request to `base` instead of the host-derived API root.
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = Some(normalize_base(base));
        self
    }

    fn repo_endpoint(&self, repo: &GitHubRepo) -> String {
        let base = self.api_base.clone().unwrap_or_else(|| repo.api_base());
        format!("{}/repos/{}/{}", base, repo.owner, repo.name)
    }
}

#[async_trait]
impl ScmClient for GitHubClient {
    fn platform(&self) -> ScmPlatform {
        ScmPlatform::GitHub
    }

    async fn fetch_default_branch(&self, repository_url: &str) -> ScmResult<String> {
        let repo = GitHubRepo::parse(repository_url)?;
        let url = self.repo_endpoint(&repo);

        let mut request = self
            .http_client
            .get(&url)
            .header("Accept", GITHUB_ACCEPT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let context = format!("GitHub {}/{}", repo.owner, repo.name);
        let response = send(request, &context).await?;
        let body: RepositoryResponse = read_json(response, &context).await?;

        if body.default_branch.trim().is_empty() {
            return Err(ScmError::MalformedResponse(format!(
                "{context}: empty default_branch"
            )));
        }
        Ok(body.default_branch)
    }

    async fn fetch_platform_identifier(
        &self,
        _repository_url: &str,
    ) -> ScmResult<PlatformIdentifier> {
        Ok(PlatformIdentifier::NotApplicable)
    }
}
