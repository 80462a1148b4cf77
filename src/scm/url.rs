//! Repository URL parsing for each platform.

use regex::Regex;
use std::sync::LazyLock;

use super::types::{ScmError, ScmResult};

/// `scheme://[user@]host[:port]/path`
static SCHEME_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(?:https?|ssh|git)://(?:[^@/]+@)?([^/:]+)(?::\d+)?/(.+)$")
        .expect("static regex is valid")
});

/// `user@host:path` (scp-like SSH)
static SCP_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s/]+@([^:/\s]+):/?(.+)$").expect("static regex is valid")
});

/// A repository URL split into host and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    /// Lowercased host name.
    pub host: String,
    /// Path without leading/trailing slashes and without `.git`.
    pub path: String,
}

impl RepoLocation {
    /// Non-empty path segments.
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }
}

/// Splits an HTTPS or SSH repository URL into host and path.
pub fn parse_location(repository_url: &str) -> ScmResult<RepoLocation> {
    let url = repository_url.trim();
    let captures = SCHEME_URL
        .captures(url)
        .or_else(|| SCP_URL.captures(url))
        .ok_or_else(|| ScmError::InvalidUrl(url.to_string()))?;

    let host = captures[1].to_lowercase();
    let mut path = captures[2]
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_matches('/')
        .to_string();
    if let Some(stripped) = path.strip_suffix(".git") {
        path = stripped.trim_end_matches('/').to_string();
    }

    if path.is_empty() {
        return Err(ScmError::InvalidUrl(url.to_string()));
    }

    Ok(RepoLocation { host, path })
}

/// A GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepo {
    pub host: String,
    pub owner: String,
    pub name: String,
}

impl GitHubRepo {
    /// Parses `github.com/{owner}/{name}[/…]` and enterprise hosts alike.
    pub fn parse(repository_url: &str) -> ScmResult<Self> {
        let location = parse_location(repository_url)?;
        let segments = location.segments();
        if segments.len() < 2 {
            return Err(ScmError::InvalidUrl(repository_url.trim().to_string()));
        }
        Ok(Self {
            owner: segments[0].to_string(),
            name: segments[1].to_string(),
            host: location.host,
        })
    }

    /// REST API root for the repository's host.
    pub fn api_base(&self) -> String {
        match self.host.as_str() {
            "github.com" | "www.github.com" => "https://api.github.com".to_string(),
            host => format!("https://{host}/api/v3"),
        }
    }
}

/// A GitLab project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLabProject {
    pub host: String,
    /// Full namespace path, e.g. `group/subgroup/project`.
    pub path: String,
}

impl GitLabProject {
    /// Parses GitLab.com and self-hosted project URLs, including nested groups.
    pub fn parse(repository_url: &str) -> ScmResult<Self> {
        let location = parse_location(repository_url)?;
        // Web URLs such as `/group/project/-/tree/main` carry UI routes after `/-/`.
        let path = location
            .path
            .split("/-/")
            .next()
            .unwrap_or_default()
            .trim_matches('/')
            .to_string();
        if path.split('/').filter(|s| !s.is_empty()).count() < 2 {
            return Err(ScmError::InvalidUrl(repository_url.trim().to_string()));
        }
        Ok(Self {
            host: location.host,
            path,
        })
    }

    /// REST API root for the project's host.
    pub fn api_base(&self) -> String {
        format!("https://{}/api/v4", self.host)
    }

    /// Project path encoded for `/projects/:id`.
    pub fn encoded_path(&self) -> String {
        urlencoding::encode(&self.path).into_owned()
    }
}

/// An Azure DevOps repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureRepo {
    pub organization: String,
    pub project: String,
    pub repository: String,
    /// `https://dev.azure.com/{org}/{project}` or the legacy visualstudio.com root.
    pub project_root: String,
}

impl AzureRepo {
    /// Parses `dev.azure.com`, `ssh.dev.azure.com` and `*.visualstudio.com` URLs.
    pub fn parse(repository_url: &str) -> ScmResult<Self> {
        let invalid = || ScmError::InvalidUrl(repository_url.trim().to_string());
        let location = parse_location(repository_url)?;
        let segments = location.segments();

        if location.host == "ssh.dev.azure.com" {
            // v3/{org}/{project}/{repo}
            return match segments.as_slice() {
                ["v3", org, project, repo] => Self::dev_azure(org, project, repo, repository_url),
                _ => Err(invalid()),
            };
        }

        let git_index = segments.iter().position(|s| *s == "_git").ok_or_else(invalid)?;
        let repository = segments.get(git_index + 1).ok_or_else(invalid)?;

        if location.host == "dev.azure.com" {
            return match &segments[..git_index] {
                [org, project] => Self::dev_azure(org, project, repository, repository_url),
                _ => Err(invalid()),
            };
        }

        if let Some(org) = location.host.strip_suffix(".visualstudio.com") {
            let project = match &segments[..git_index] {
                [project] | ["DefaultCollection", project] => *project,
                _ => return Err(invalid()),
            };
            let project = decode_segment(project, repository_url)?;
            return Ok(Self {
                organization: org.to_string(),
                project_root: format!(
                    "https://{}/{}",
                    location.host,
                    urlencoding::encode(&project)
                ),
                project,
                repository: decode_segment(repository, repository_url)?,
            });
        }

        Err(invalid())
    }

    fn dev_azure(
        org: &str,
        project: &str,
        repository: &str,
        repository_url: &str,
    ) -> ScmResult<Self> {
        let project = decode_segment(project, repository_url)?;
        Ok(Self {
            project_root: format!(
                "https://dev.azure.com/{org}/{}",
                urlencoding::encode(&project)
            ),
            organization: org.to_string(),
            project,
            repository: decode_segment(repository, repository_url)?,
        })
    }
}

/// Project and repository names arrive percent-encoded (`My%20Repo`).
fn decode_segment(segment: &str, repository_url: &str) -> ScmResult<String> {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ScmError::InvalidUrl(repository_url.trim().to_string()))
}

/// Owner and name used to address a repository in an import target.
///
/// Azure repositories are owned by their project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
}

impl RepoCoordinates {
    /// Derives owner/name from any supported repository URL.
    pub fn from_url(repository_url: &str) -> ScmResult<Self> {
        if let Ok(azure) = AzureRepo::parse(repository_url) {
            return Ok(Self {
                owner: azure.project,
                name: azure.repository,
            });
        }
        let location = parse_location(repository_url)?;
        let segments = location.segments();
        match segments.as_slice() {
            [.., owner, name] => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(ScmError::InvalidUrl(repository_url.trim().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location_variants() {
        let https = parse_location("https://github.com/acme/api.git/").expect("https");
        assert_eq!(https.host, "github.com");
        assert_eq!(https.path, "acme/api");

        let scp = parse_location("git@gitlab.acme.io:platform/core/api.git").expect("scp");
        assert_eq!(scp.host, "gitlab.acme.io");
        assert_eq!(scp.path, "platform/core/api");

        let ssh = parse_location("ssh://git@github.com:22/acme/api").expect("ssh");
        assert_eq!(ssh.host, "github.com");
        assert_eq!(ssh.path, "acme/api");
    }

    #[test]
    fn test_parse_location_rejects_garbage() {
        assert!(parse_location("not a url").is_err());
        assert!(parse_location("https://github.com/").is_err());
    }

    #[test]
    fn test_github_repo() {
        let repo = GitHubRepo::parse("https://github.com/acme/api/tree/main").expect("parse");
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "api");
        assert_eq!(repo.api_base(), "https://api.github.com");

        let ghe = GitHubRepo::parse("https://github.acme.io/team/tool").expect("parse");
        assert_eq!(ghe.api_base(), "https://github.acme.io/api/v3");

        assert!(GitHubRepo::parse("https://github.com/acme").is_err());
    }

    #[test]
    fn test_gitlab_project_nested_groups() {
        let project = GitLabProject::parse("https://gitlab.com/acme/platform/api/-/tree/main")
            .expect("parse");
        assert_eq!(project.path, "acme/platform/api");
        assert_eq!(project.encoded_path(), "acme%2Fplatform%2Fapi");
        assert_eq!(project.api_base(), "https://gitlab.com/api/v4");
    }

    #[test]
    fn test_azure_repo_forms() {
        let modern =
            AzureRepo::parse("https://acme@dev.azure.com/acme/Core/_git/api").expect("dev");
        assert_eq!(modern.organization, "acme");
        assert_eq!(modern.project, "Core");
        assert_eq!(modern.repository, "api");
        assert_eq!(modern.project_root, "https://dev.azure.com/acme/Core");

        let ssh = AzureRepo::parse("git@ssh.dev.azure.com:v3/acme/Core/api").expect("ssh");
        assert_eq!(ssh.repository, "api");

        let legacy =
            AzureRepo::parse("https://acme.visualstudio.com/DefaultCollection/Core/_git/api")
                .expect("legacy");
        assert_eq!(legacy.organization, "acme");
        assert_eq!(legacy.project_root, "https://acme.visualstudio.com/Core");

        assert!(AzureRepo::parse("https://dev.azure.com/acme/Core").is_err());

        let spaced = AzureRepo::parse("https://dev.azure.com/acme/Core%20Platform/_git/My%20Repo")
            .expect("spaced");
        assert_eq!(spaced.project, "Core Platform");
        assert_eq!(spaced.repository, "My Repo");
        assert_eq!(spaced.project_root, "https://dev.azure.com/acme/Core%20Platform");
        assert!(AzureRepo::parse("https://dev.azure.com/acme/Core/_git/%FF%FE").is_err());
    }

    #[test]
    fn test_coordinates() {
        let gh = RepoCoordinates::from_url("https://github.com/acme/api.git").expect("gh");
        assert_eq!((gh.owner.as_str(), gh.name.as_str()), ("acme", "api"));

        let az = RepoCoordinates::from_url("https://dev.azure.com/acme/Core/_git/api").expect("az");
        assert_eq!((az.owner.as_str(), az.name.as_str()), ("Core", "api"));
    }
}
