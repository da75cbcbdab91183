//! Commit creation through the repository host's git data API.
//!
//! The commit is assembled out of band (tree, then commit object) and only
//! becomes visible when the branch ref is moved in the final request. A
//! failure at any earlier step leaves the branch exactly where it was.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use build_artifacts::validate_relative_path;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use super::{EmptyCommitPolicy, InstallationAuthenticator, InstallationToken, RepositoryClient};
use crate::config::{env_lookup, parse_or, ConfigError};
use crate::domain::{CommitContext, CommitSha, FileChange, PipelineError, Result};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the repository host client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryHostConfig {
    /// Host API URL (e.g., https://api.github.com)
    pub api_url: String,

    /// Branch commits are pushed to
    pub target_branch: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Handling of commits without a file delta
    pub empty_commit_policy: EmptyCommitPolicy,
}

impl Default for RepositoryHostConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            target_branch: "main".to_string(),
            timeout_seconds: 30,
            empty_commit_policy: EmptyCommitPolicy::Allow,
        }
    }
}

impl RepositoryHostConfig {
    /// Read `BUILDCOMMIT_API_URL`, `BUILDCOMMIT_TARGET_BRANCH`,
    /// `BUILDCOMMIT_HOST_TIMEOUT_SECS` and `BUILDCOMMIT_EMPTY_COMMITS`.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            api_url: lookup("BUILDCOMMIT_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            target_branch: lookup("BUILDCOMMIT_TARGET_BRANCH").unwrap_or(defaults.target_branch),
            timeout_seconds: parse_or(
                &lookup,
                "BUILDCOMMIT_HOST_TIMEOUT_SECS",
                defaults.timeout_seconds,
            )?,
            empty_commit_policy: parse_or(
                &lookup,
                "BUILDCOMMIT_EMPTY_COMMITS",
                defaults.empty_commit_policy,
            )?,
        })
    }
}

// =============================================================================
// Git data API types
// =============================================================================

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct CommitObjectResponse {
    sha: String,
    tree: GitObject,
}

#[derive(Debug, Serialize)]
struct TreeEntry<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: Vec<TreeEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// =============================================================================
// Client
// =============================================================================

/// Repository client speaking the git data REST API.
pub struct GitDataClient {
    client: Client,
    config: RepositoryHostConfig,
    auth: Arc<dyn InstallationAuthenticator>,
}

/// Per-commit request scope: target repository plus credential.
struct Session<'a> {
    client: &'a GitDataClient,
    token: InstallationToken,
    owner: &'a str,
    repo: &'a str,
}

impl GitDataClient {
    /// Create a new repository client.
    pub fn new(
        config: RepositoryHostConfig,
        auth: Arc<dyn InstallationAuthenticator>,
    ) -> std::result::Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("buildcommit/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config,
            auth,
        })
    }

    fn repo_url(&self, owner: &str, repo: &str, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.config.api_url,
            urlencoding::encode(owner),
            urlencoding::encode(repo),
            tail
        )
    }
}

/// Short, credential-free description of a failed host response.
async fn describe_failure(response: Response) -> String {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().chars().take(200).collect());
    if detail.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {detail}")
    }
}

impl Session<'_> {
    fn commit_fault(&self, step: &str, cause: impl std::fmt::Display) -> PipelineError {
        PipelineError::CommitFailed(format!(
            "commit to {}/{} failed while {step}: {cause}",
            self.owner, self.repo
        ))
    }

    fn request(&self, method: Method, tail: &str) -> RequestBuilder {
        self.client
            .client
            .request(method, self.client.repo_url(self.owner, self.repo, tail))
            .bearer_auth(self.token.secret())
            .header("Accept", "application/json")
    }

    async fn send<T: DeserializeOwned>(
        &self,
        step: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| self.commit_fault(step, e.without_url()))?;
        if !response.status().is_success() {
            let failure = describe_failure(response).await;
            error!(step, failure = %failure, "Repository host rejected request");
            return Err(self.commit_fault(step, failure));
        }
        response.json::<T>().await.map_err(|e| {
            self.commit_fault(step, format!("unreadable response ({})", e.without_url()))
        })
    }

    async fn head_commit(&self, branch: &str) -> Result<String> {
        let tail = format!("git/ref/heads/{branch}");
        let r: RefResponse = self
            .send("reading the target branch", self.request(Method::GET, &tail))
            .await?;
        Ok(r.object.sha)
    }

    async fn base_tree(&self, head: &str) -> Result<String> {
        let tail = format!("git/commits/{head}");
        let c: CommitObjectResponse = self
            .send("reading the head commit", self.request(Method::GET, &tail))
            .await?;
        debug!(head = %c.sha, tree = %c.tree.sha, "Resolved base tree");
        Ok(c.tree.sha)
    }

    async fn create_tree(&self, base_tree: &str, files: &[FileChange]) -> Result<String> {
        let body = CreateTreeRequest {
            base_tree,
            tree: files
                .iter()
                .map(|f| TreeEntry {
                    path: &f.path,
                    mode: "100644",
                    kind: "blob",
                    content: &f.content,
                })
                .collect(),
        };
        let tree: GitObject = self
            .send(
                "creating the tree",
                self.request(Method::POST, "git/trees").json(&body),
            )
            .await?;
        Ok(tree.sha)
    }

    async fn create_commit_object(
        &self,
        message: &str,
        tree: &str,
        parent: &str,
    ) -> Result<String> {
        let body = CreateCommitRequest {
            message,
            tree,
            parents: vec![parent],
        };
        let commit: GitObject = self
            .send(
                "creating the commit",
                self.request(Method::POST, "git/commits").json(&body),
            )
            .await?;
        Ok(commit.sha)
    }

    async fn move_branch(&self, branch: &str, sha: &str) -> Result<()> {
        let tail = format!("git/refs/heads/{branch}");
        let body = UpdateRefRequest { sha, force: false };
        let _: serde_json::Value = self
            .send(
                "updating the target branch",
                self.request(Method::PATCH, &tail).json(&body),
            )
            .await?;
        Ok(())
    }
}

fn validate_changes(context: &CommitContext, files: &[FileChange]) -> Result<()> {
    for file in files {
        validate_relative_path(&file.path).map_err(|e| {
            PipelineError::CommitFailed(format!(
                "commit to {}/{} rejected: {e}",
                context.owner, context.repo
            ))
        })?;
    }
    Ok(())
}

#[async_trait]
impl RepositoryClient for GitDataClient {
    #[instrument(
        skip(self, context, message, files),
        fields(
            owner = %context.owner,
            repo = %context.repo,
            build_id = %context.build_id,
            files = files.len()
        )
    )]
    async fn create_commit(
        &self,
        installation_id: &str,
        context: &CommitContext,
        message: &str,
        files: Vec<FileChange>,
    ) -> Result<CommitSha> {
        validate_changes(context, &files)?;

        // Authenticate before any request that touches the repository.
        let token = self.auth.authenticate(installation_id).await?;
        let session = Session {
            client: self,
            token,
            owner: &context.owner,
            repo: &context.repo,
        };
        let branch = self.config.target_branch.as_str();

        let head = session.head_commit(branch).await?;
        let base_tree = session.base_tree(&head).await?;
        let tree = if files.is_empty() {
            base_tree.clone()
        } else {
            session.create_tree(&base_tree, &files).await?
        };

        if tree == base_tree && self.config.empty_commit_policy == EmptyCommitPolicy::Reject {
            info!(head = %head, "No file delta; empty commit rejected");
            return Err(PipelineError::EmptyCommit(format!(
                "nothing to commit to {}/{}: build {} has no changes against {branch}",
                context.owner, context.repo, context.build_id
            )));
        }

        let sha = session.create_commit_object(message, &tree, &head).await?;
        let sha = CommitSha::try_from(sha)
            .map_err(|e| session.commit_fault("creating the commit", e))?;
        session.move_branch(branch, sha.as_str()).await?;

        info!(commit_sha = %sha, branch, "Commit pushed");
        Ok(sha)
    }
}
