//! Repository host access: installation authentication and atomic commits.

pub mod auth;
pub mod git_data;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CommitContext, CommitSha, FileChange, Result};

pub use auth::{HttpTokenBroker, StaticTokenAuthenticator, TokenBrokerConfig};
pub use git_data::{GitDataClient, RepositoryHostConfig};

/// Short-lived credential scoped to one installation.
#[derive(Clone, PartialEq, Eq)]
pub struct InstallationToken {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl InstallationToken {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Raw secret, for the `Authorization` header only.
    pub fn secret(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the token has expired as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Exchanges an installation id for a short-lived credential.
///
/// Failures must surface as `PipelineError::AuthenticationFailed`.
#[async_trait]
pub trait InstallationAuthenticator: Send + Sync {
    async fn authenticate(&self, installation_id: &str) -> Result<InstallationToken>;
}

/// Creates commits on the remote repository host.
///
/// Implementations authenticate as `installation_id` before any write and
/// create exactly one commit containing every change, or leave the target
/// ref untouched and fail with `CommitFailed`. The returned SHA is the only
/// success signal.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    async fn create_commit(
        &self,
        installation_id: &str,
        context: &CommitContext,
        message: &str,
        files: Vec<FileChange>,
    ) -> Result<CommitSha>;
}

/// What to do when a commit would carry no file delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyCommitPolicy {
    /// Create a commit with no file delta.
    #[default]
    Allow,
    /// Fail with `EmptyCommit`, leaving the ref untouched.
    Reject,
}

impl FromStr for EmptyCommitPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(EmptyCommitPolicy::Allow),
            "reject" => Ok(EmptyCommitPolicy::Reject),
            other => Err(format!("expected `allow` or `reject`, got `{other}`")),
        }
    }
}
