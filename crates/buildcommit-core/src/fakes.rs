//! Scripted collaborators for exercising the dispatcher (testing only)
//!
//! Each fake records what it was asked to do so tests can assert on the
//! calls a request produced, not just on the published status.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::diff::DiffResolver;
use crate::domain::{
    ChangedFile, CommitContext, CommitSha, CommitStatus, FileChange, PipelineError, Result,
};
use crate::publisher::StatusPublisher;
use crate::repository::RepositoryClient;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Diff
// =============================================================================

/// One `compute_changed_files` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffCall {
    pub resource_id: String,
    pub previous_build_id: Option<String>,
    pub current_build_id: String,
}

/// Diff resolver answering from a script keyed by current build id.
#[derive(Debug)]
pub struct ScriptedDiffResolver {
    default: Result<Vec<ChangedFile>>,
    per_build: HashMap<String, Result<Vec<ChangedFile>>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<DiffCall>>,
}

impl ScriptedDiffResolver {
    /// Answer every build with `files`.
    pub fn returning(files: Vec<ChangedFile>) -> Self {
        Self {
            default: Ok(files),
            per_build: HashMap::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail every build with `error`.
    pub fn failing(error: PipelineError) -> Self {
        Self {
            default: Err(error),
            ..Self::returning(Vec::new())
        }
    }

    /// Override the answer for one build.
    pub fn with_build(mut self, build_id: &str, result: Result<Vec<ChangedFile>>) -> Self {
        self.per_build.insert(build_id.to_string(), result);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<DiffCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl DiffResolver for ScriptedDiffResolver {
    async fn compute_changed_files(
        &self,
        resource_id: &str,
        previous_build_id: Option<&str>,
        current_build_id: &str,
    ) -> Result<Vec<ChangedFile>> {
        lock(&self.calls).push(DiffCall {
            resource_id: resource_id.to_string(),
            previous_build_id: previous_build_id.map(str::to_string),
            current_build_id: current_build_id.to_string(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.per_build
            .get(current_build_id)
            .unwrap_or(&self.default)
            .clone()
    }
}

// =============================================================================
// Repository
// =============================================================================

/// One `create_commit` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommit {
    pub installation_id: String,
    pub context: CommitContext,
    pub message: String,
    pub files: Vec<FileChange>,
}

/// Repository client that records commits and answers from a script.
///
/// On success the returned SHA is the fixed one if set, otherwise
/// `sha-{build_id}-{n}` where `n` counts commits made so far.
#[derive(Debug, Default)]
pub struct ScriptedRepositoryClient {
    sha: Option<String>,
    error: Option<PipelineError>,
    delay: Option<Duration>,
    commits: Mutex<Vec<RecordedCommit>>,
}

impl ScriptedRepositoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every commit with `sha`.
    pub fn returning_sha(sha: &str) -> Self {
        Self {
            sha: Some(sha.to_string()),
            ..Self::default()
        }
    }

    /// Fail every commit with `error`.
    pub fn failing(error: PipelineError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn commits(&self) -> Vec<RecordedCommit> {
        lock(&self.commits).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.commits).len()
    }
}

#[async_trait]
impl RepositoryClient for ScriptedRepositoryClient {
    async fn create_commit(
        &self,
        installation_id: &str,
        context: &CommitContext,
        message: &str,
        files: Vec<FileChange>,
    ) -> Result<CommitSha> {
        let n = {
            let mut commits = lock(&self.commits);
            commits.push(RecordedCommit {
                installation_id: installation_id.to_string(),
                context: context.clone(),
                message: message.to_string(),
                files,
            });
            commits.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let sha = match &self.sha {
            Some(sha) => sha.clone(),
            None => format!("sha-{}-{n}", context.build_id),
        };
        CommitSha::try_from(sha).map_err(|e| PipelineError::CommitFailed(e.to_string()))
    }
}

// =============================================================================
// Publisher
// =============================================================================

/// Status publisher that keeps every status it was handed.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    error: Option<PipelineError>,
    delay: Option<Duration>,
    published: Mutex<Vec<(String, CommitStatus)>>,
    attempts: Mutex<usize>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every publish with `error`; attempts are still counted.
    pub fn failing(error: PipelineError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Sleep before accepting.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Successfully published `(build_id, status)` pairs, in order.
    pub fn published(&self) -> Vec<(String, CommitStatus)> {
        lock(&self.published).clone()
    }

    /// Statuses published for one build.
    pub fn for_build(&self, build_id: &str) -> Vec<CommitStatus> {
        lock(&self.published)
            .iter()
            .filter(|(id, _)| id == build_id)
            .map(|(_, status)| status.clone())
            .collect()
    }

    /// Publish calls, successful or not.
    pub fn attempts(&self) -> usize {
        *lock(&self.attempts)
    }
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish(&self, build_id: &str, status: &CommitStatus) -> Result<()> {
        *lock(&self.attempts) += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        lock(&self.published).push((build_id.to_string(), status.clone()));
        Ok(())
    }
}
