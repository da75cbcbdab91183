//! Terminal commit status emitted once per request.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::PipelineError;

/// SHA of a created commit. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitSha(String);

/// Rejected commit SHA value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("commit sha must not be empty")]
pub struct InvalidCommitSha;

impl CommitSha {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CommitSha {
    type Error = InvalidCommitSha;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(InvalidCommitSha);
        }
        Ok(CommitSha(trimmed.to_string()))
    }
}

impl TryFrom<&str> for CommitSha {
    type Error = InvalidCommitSha;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        CommitSha::try_from(value.to_string())
    }
}

impl From<CommitSha> for String {
    fn from(sha: CommitSha) -> Self {
        sha.0
    }
}

impl fmt::Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOutcome {
    Success,
    Failed,
}

/// Payload attached to a successful status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub commit_sha: CommitSha,
}

/// Status event published on the status topic, keyed by build id.
///
/// Only constructible through [`CommitStatus::success`] and
/// [`CommitStatus::failed`]: a `Success` always carries a commit SHA and a
/// `Failed` never does. Deserialization enforces the same rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireCommitStatus", into = "WireCommitStatus")]
pub struct CommitStatus {
    action_step_id: String,
    message: String,
    outcome: CommitOutcome,
    payload: Option<StatusPayload>,
}

impl CommitStatus {
    /// Success status confirming the push to `owner/repo`.
    pub fn success(
        action_step_id: impl Into<String>,
        owner: &str,
        repo: &str,
        sha: CommitSha,
    ) -> Self {
        Self {
            action_step_id: action_step_id.into(),
            message: format!("Commit {sha} pushed successfully to {owner}/{repo}"),
            outcome: CommitOutcome::Success,
            payload: Some(StatusPayload { commit_sha: sha }),
        }
    }

    /// Failure status carrying the causing error's message.
    pub fn failed(action_step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action_step_id: action_step_id.into(),
            message: message.into(),
            outcome: CommitOutcome::Failed,
            payload: None,
        }
    }

    /// Failure status for a pipeline fault.
    pub fn from_error(action_step_id: impl Into<String>, error: &PipelineError) -> Self {
        Self::failed(action_step_id, error.message())
    }

    pub fn action_step_id(&self) -> &str {
        &self.action_step_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn outcome(&self) -> CommitOutcome {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome == CommitOutcome::Success
    }

    /// Commit SHA of a successful status.
    pub fn commit_sha(&self) -> Option<&CommitSha> {
        self.payload.as_ref().map(|p| &p.commit_sha)
    }

    /// Serialize to the JSON wire format.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCommitStatus {
    action_step_id: String,
    message: String,
    outcome: CommitOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<StatusPayload>,
}

impl TryFrom<WireCommitStatus> for CommitStatus {
    type Error = String;

    fn try_from(wire: WireCommitStatus) -> std::result::Result<Self, Self::Error> {
        match (wire.outcome, &wire.payload) {
            (CommitOutcome::Success, None) => {
                Err("Success status must carry a commitSha payload".to_string())
            }
            (CommitOutcome::Failed, Some(_)) => {
                Err("Failed status must not carry a payload".to_string())
            }
            _ => Ok(CommitStatus {
                action_step_id: wire.action_step_id,
                message: wire.message,
                outcome: wire.outcome,
                payload: wire.payload,
            }),
        }
    }
}

impl From<CommitStatus> for WireCommitStatus {
    fn from(status: CommitStatus) -> Self {
        WireCommitStatus {
            action_step_id: status.action_step_id,
            message: status.message,
            outcome: status.outcome,
            payload: status.payload,
        }
    }
}
