//! In-memory SCM client with scripted responses, for scheduler and pipeline tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::types::{MetadataRequest, PlatformIdentifier, RepoMetadata, ScmError, ScmResult};
use super::ScmClient;
use crate::error::ErrorKind;
use crate::records::ScmPlatform;
use crate::scheduler::CancelToken;

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Outcome {
    Branch(String),
    /// Branch plus project id, as GitLab answers.
    Project { id: u64, branch: Option<String> },
    Error(ErrorKind, Option<Duration>),
}

impl Outcome {
    fn into_result(self, request: MetadataRequest) -> ScmResult<RepoMetadata> {
        match self {
            Outcome::Branch(branch) => Ok(RepoMetadata {
                default_branch: request.branch.then_some(branch),
                identifier: PlatformIdentifier::NotApplicable,
            }),
            Outcome::Project { id, branch } => Ok(RepoMetadata {
                default_branch: if request.branch { branch } else { None },
                identifier: if request.identifier {
                    PlatformIdentifier::Id(id.to_string())
                } else {
                    PlatformIdentifier::NotApplicable
                },
            }),
            Outcome::Error(kind, retry_after) => Err(error_of(kind, retry_after)),
        }
    }
}

fn error_of(kind: ErrorKind, retry_after: Option<Duration>) -> ScmError {
    match kind {
        ErrorKind::RateLimited => ScmError::RateLimited { retry_after },
        ErrorKind::NotFound => ScmError::NotFound("scripted".into()),
        ErrorKind::AuthError => ScmError::Auth {
            status: 401,
            message: "scripted".into(),
        },
        ErrorKind::UnsupportedSource => ScmError::UnsupportedSource("scripted".into()),
        ErrorKind::MalformedResponse => ScmError::MalformedResponse("scripted".into()),
        ErrorKind::InvalidRepositoryUrl => ScmError::InvalidUrl("scripted".into()),
        _ => ScmError::Transient("scripted".into()),
    }
}

/// A recorded call.
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub at: Instant,
    /// Whether the observed token was already cancelled when the call began.
    pub after_cancel: bool,
}

/// Answers from per-URL scripts, falling back to a default branch.
pub struct ScriptedClient {
    platform: ScmPlatform,
    requires_identifier: bool,
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    fallback: Outcome,
    latency: Duration,
    observe: Option<CancelToken>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedClient {
    pub fn new(platform: ScmPlatform) -> Self {
        Self {
            platform,
            requires_identifier: false,
            scripts: Mutex::new(HashMap::new()),
            fallback: Outcome::Branch("main".into()),
            latency: Duration::ZERO,
            observe: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Responses for `url`, consumed in order; the fallback answers afterwards.
    pub fn script(self, url: &str, outcomes: Vec<Outcome>) -> Self {
        self.scripts
            .lock()
            .expect("scripts lock")
            .insert(url.to_string(), outcomes.into());
        self
    }

    pub fn with_fallback(mut self, fallback: Outcome) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requiring_identifier(mut self) -> Self {
        self.requires_identifier = true;
        self
    }

    /// Records whether `token` was cancelled at the start of each call.
    pub fn observing(mut self, token: CancelToken) -> Self {
        self.observe = Some(token);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    async fn answer(&self, url: &str, request: MetadataRequest) -> ScmResult<RepoMetadata> {
        self.calls.lock().expect("calls lock").push(Call {
            url: url.to_string(),
            at: Instant::now(),
            after_cancel: self.observe.as_ref().is_some_and(CancelToken::is_cancelled),
        });
        let outcome = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        outcome.into_result(request)
    }
}

#[async_trait]
impl ScmClient for ScriptedClient {
    fn platform(&self) -> ScmPlatform {
        self.platform
    }

    fn requires_identifier(&self) -> bool {
        self.requires_identifier
    }

    async fn fetch_default_branch(&self, repository_url: &str) -> ScmResult<String> {
        let request = MetadataRequest {
            branch: true,
            identifier: false,
        };
        let metadata = self.answer(repository_url, request).await?;
        metadata
            .default_branch
            .ok_or_else(|| ScmError::NotFound(repository_url.to_string()))
    }

    async fn fetch_platform_identifier(
        &self,
        repository_url: &str,
    ) -> ScmResult<PlatformIdentifier> {
        let request = MetadataRequest {
            branch: false,
            identifier: true,
        };
        Ok(self.answer(repository_url, request).await?.identifier)
    }

    async fn fetch_metadata(
        &self,
        repository_url: &str,
        request: MetadataRequest,
    ) -> ScmResult<RepoMetadata> {
        self.answer(repository_url, request).await
    }
}
