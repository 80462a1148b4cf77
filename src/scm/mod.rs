//! SCM platform clients.
//!
//! One [`ScmClient`] implementation per supported platform. Each lookup is a
//! single network round trip with no retrying; the scheduler's retry
//! controller owns retries and backoff.
//!
//! # Example
//!
//! ```ignore
//! use scm_enrich::scm::{GitHubClient, ScmClient};
//!
//! let client = GitHubClient::new(http, Some(token));
//! let branch = client.fetch_default_branch("https://github.com/acme/api").await?;
//! ```

pub mod azure;
pub mod github;
pub mod gitlab;
pub mod http;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;
pub mod url;

pub use azure::AzureDevOpsClient;
pub use github::GitHubClient;
pub use gitlab::GitLabClient;
pub use http::build_http_client;
pub use types::{
    MetadataRequest, PlatformIdentifier, RepoMetadata, ScmError, ScmResult,
};
pub use url::RepoCoordinates;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::records::ScmPlatform;

/// Metadata lookups against one SCM platform.
#[async_trait]
pub trait ScmClient: Send + Sync {
    /// Platform served by this client.
    fn platform(&self) -> ScmPlatform;

    /// Whether import targets for this platform need a project identifier.
    fn requires_identifier(&self) -> bool {
        false
    }

    /// Rejects URLs this platform cannot address, without any I/O.
    fn check_url(&self, repository_url: &str) -> ScmResult<()> {
        match self.platform() {
            ScmPlatform::GitHub => url::GitHubRepo::parse(repository_url).map(drop),
            ScmPlatform::GitLab => url::GitLabProject::parse(repository_url).map(drop),
            ScmPlatform::AzureDevOps => url::AzureRepo::parse(repository_url).map(drop),
        }
    }

    /// Fetches the repository's default branch.
    async fn fetch_default_branch(&self, repository_url: &str) -> ScmResult<String>;

    /// Fetches the platform's project identifier.
    ///
    /// Platforms that address repositories by URL return
    /// [`PlatformIdentifier::NotApplicable`], never an error.
    async fn fetch_platform_identifier(&self, repository_url: &str)
        -> ScmResult<PlatformIdentifier>;

    /// Resolves the requested fields.
    ///
    /// The default calls the two single-field lookups; platforms that return
    /// both fields from one endpoint override this to use one round trip.
    async fn fetch_metadata(
        &self,
        repository_url: &str,
        request: MetadataRequest,
    ) -> ScmResult<RepoMetadata> {
        let mut metadata = RepoMetadata::default();
        if request.branch {
            metadata.default_branch = Some(self.fetch_default_branch(repository_url).await?);
        }
        if request.identifier {
            metadata.identifier = self.fetch_platform_identifier(repository_url).await?;
        }
        Ok(metadata)
    }
}

/// Per-platform access tokens.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmCredentials {
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default)]
    pub gitlab_token: Option<String>,
    /// Azure DevOps personal access token.
    #[serde(default)]
    pub azure_token: Option<String>,
}

impl ScmCredentials {
    /// Token for a platform, ignoring blank values.
    pub fn token_for(&self, platform: ScmPlatform) -> Option<&str> {
        let token = match platform {
            ScmPlatform::GitHub => self.github_token.as_deref(),
            ScmPlatform::GitLab => self.gitlab_token.as_deref(),
            ScmPlatform::AzureDevOps => self.azure_token.as_deref(),
        };
        token.map(str::trim).filter(|t| !t.is_empty())
    }
}

impl fmt::Debug for ScmCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |t: &Option<String>| if t.is_some() { "***" } else { "<unset>" };
        f.debug_struct("ScmCredentials")
            .field("github_token", &mask(&self.github_token))
            .field("gitlab_token", &mask(&self.gitlab_token))
            .field("azure_token", &mask(&self.azure_token))
            .finish()
    }
}

/// Explicit API roots replacing the ones derived from repository hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiBaseOverrides {
    #[serde(default)]
    pub github: Option<String>,
    #[serde(default)]
    pub gitlab: Option<String>,
    /// Replaces `https://dev.azure.com/{org}/{project}`; the project path is appended.
    #[serde(default)]
    pub azure: Option<String>,
}

/// Client lookup by platform.
#[derive(Clone, Default)]
pub struct ScmClients {
    clients: HashMap<ScmPlatform, Arc<dyn ScmClient>>,
}

impl ScmClients {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the standard client for every platform.
    pub fn standard(
        http: Client,
        credentials: &ScmCredentials,
        api_bases: &ApiBaseOverrides,
    ) -> Self {
        let token = |p| credentials.token_for(p).map(str::to_string);

        let mut github = GitHubClient::new(http.clone(), token(ScmPlatform::GitHub));
        if let Some(base) = &api_bases.github {
            github = github.with_api_base(base);
        }
        let mut gitlab = GitLabClient::new(http.clone(), token(ScmPlatform::GitLab));
        if let Some(base) = &api_bases.gitlab {
            gitlab = gitlab.with_api_base(base);
        }
        let mut azure = AzureDevOpsClient::new(http, token(ScmPlatform::AzureDevOps));
        if let Some(base) = &api_bases.azure {
            azure = azure.with_api_base(base);
        }

        Self::new().with(github).with(gitlab).with(azure)
    }

    /// Registers a client for its platform, replacing any previous one.
    pub fn with(mut self, client: impl ScmClient + 'static) -> Self {
        self.insert(Arc::new(client));
        self
    }

    /// Registers a shared client for its platform.
    pub fn insert(&mut self, client: Arc<dyn ScmClient>) {
        self.clients.insert(client.platform(), client);
    }

    /// Client for a platform, if registered.
    pub fn get(&self, platform: ScmPlatform) -> Option<Arc<dyn ScmClient>> {
        self.clients.get(&platform).cloned()
    }

    /// Whether targets for `platform` need a project identifier.
    pub fn requires_identifier(&self, platform: ScmPlatform) -> bool {
        self.clients
            .get(&platform)
            .is_some_and(|c| c.requires_identifier())
    }
}

impl fmt::Debug for ScmClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut platforms: Vec<_> = self.clients.keys().collect();
        platforms.sort();
        f.debug_struct("ScmClients")
            .field("platforms", &platforms)
            .finish()
    }
}

/// Trims a trailing slash from a configured API root.
pub(crate) fn normalize_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}
