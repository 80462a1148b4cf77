//! Azure DevOps (Azure Repos) client.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::http::{read_json, send};
use super::types::{PlatformIdentifier, ScmError, ScmResult};
use super::url::AzureRepo;
use super::{normalize_base, ScmClient};
use crate::records::ScmPlatform;

const API_VERSION: &str = "6.0";
const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Subset of `GET {project}/_apis/git/repositories/{repo}`.
///
/// `defaultBranch` is absent for repositories without commits.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryResponse {
    #[serde(default)]
    default_branch: Option<String>,
}

/// Looks up repositories through the Azure DevOps Git REST API.
///
/// Anonymous access is not possible; without a PAT the client fails every
/// lookup with an authentication error before touching the network.
pub struct AzureDevOpsClient {
    http_client: Client,
    personal_access_token: Option<String>,
    api_base: Option<String>,
}

impl AzureDevOpsClient {
    pub fn new(http_client: Client, personal_access_token: Option<String>) -> Self {
        Self {
            http_client,
            personal_access_token,
            api_base: None,
        }
    }

    /// Replaces the organisation root; `/{project}` is appended.
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = Some(normalize_base(base));
        self
    }

    fn repository_endpoint(&self, repo: &AzureRepo) -> String {
        let project_root = match &self.api_base {
            Some(base) => format!("{}/{}", base, urlencoding::encode(&repo.project)),
            None => repo.project_root.clone(),
        };
        format!(
            "{}/_apis/git/repositories/{}?api-version={}",
            project_root,
            urlencoding::encode(&repo.repository),
            API_VERSION
        )
    }
}

/// `Basic base64(":" + pat)`, the form Azure DevOps expects for PATs.
fn basic_auth_header(pat: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!(":{pat}")))
}

#[async_trait]
impl ScmClient for AzureDevOpsClient {
    fn platform(&self) -> ScmPlatform {
        ScmPlatform::AzureDevOps
    }

    async fn fetch_default_branch(&self, repository_url: &str) -> ScmResult<String> {
        let repo = AzureRepo::parse(repository_url)?;
        let context = format!("Azure DevOps {}/{}", repo.project, repo.repository);

        let pat = self.personal_access_token.as_deref().ok_or_else(|| ScmError::Auth {
            status: 0,
            message: format!("{context}: no Azure DevOps token configured"),
        })?;

        let request = self
            .http_client
            .get(self.repository_endpoint(&repo))
            .header("Authorization", basic_auth_header(pat));

        let response = send(request, &context).await?;
        // Rejected PATs get a 203 with the HTML sign-in page.
        if response.status() == StatusCode::NON_AUTHORITATIVE_INFORMATION {
            return Err(ScmError::Auth {
                status: StatusCode::NON_AUTHORITATIVE_INFORMATION.as_u16(),
                message: format!("{context}: redirected to sign-in"),
            });
        }

        let body: RepositoryResponse = read_json(response, &context).await?;
        body.default_branch
            .map(|b| b.trim_start_matches(BRANCH_REF_PREFIX).to_string())
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| {
                ScmError::NotFound(format!("{context}: repository has no default branch"))
            })
    }

    async fn fetch_platform_identifier(
        &self,
        _repository_url: &str,
    ) -> ScmResult<PlatformIdentifier> {
        Ok(PlatformIdentifier::NotApplicable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_basic_auth_header() {
        // base64(":pat") == "OnBhdA=="
        assert_eq!(basic_auth_header("pat"), "Basic OnBhdA==");
    }

    #[tokio::test]
    async fn test_fetch_default_branch_strips_ref_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Core/_apis/git/repositories/api"))
            .and(query_param("api-version", API_VERSION))
            .and(header("authorization", "Basic OnBhdA=="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "api",
                "defaultBranch": "refs/heads/release"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            AzureDevOpsClient::new(Client::new(), Some("pat".into())).with_api_base(&server.uri());
        let branch = client
            .fetch_default_branch("https://dev.azure.com/acme/Core/_git/api")
            .await
            .expect("branch");
        assert_eq!(branch, "release");
    }

    #[tokio::test]
    async fn test_spaced_names_are_encoded_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Core%20Platform/_apis/git/repositories/My%20Repo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "My Repo",
                "defaultBranch": "refs/heads/main"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            AzureDevOpsClient::new(Client::new(), Some("pat".into())).with_api_base(&server.uri());
        let branch = client
            .fetch_default_branch("https://dev.azure.com/acme/Core%20Platform/_git/My%20Repo")
            .await
            .expect("branch");
        assert_eq!(branch, "main");
    }

    #[tokio::test]
    async fn test_missing_token_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = AzureDevOpsClient::new(Client::new(), None).with_api_base(&server.uri());
        let err = client
            .fetch_default_branch("https://dev.azure.com/acme/Core/_git/api")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthError);
    }

    #[tokio::test]
    async fn test_sign_in_redirect_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(203).set_body_string("<html>Sign in</html>"))
            .mount(&server)
            .await;

        let client = AzureDevOpsClient::new(Client::new(), Some("stale".into()))
            .with_api_base(&server.uri());
        let err = client
            .fetch_default_branch("https://acme.visualstudio.com/Core/_git/api")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthError);
    }

    #[tokio::test]
    async fn test_non_azure_url_is_invalid() {
        let client = AzureDevOpsClient::new(Client::new(), Some("pat".into()));
        let err = client
            .fetch_default_branch("https://github.com/acme/api")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRepositoryUrl);
    }
}
