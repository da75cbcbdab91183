//! Inbound commit request.

use serde::{Deserialize, Serialize};

/// Commit metadata supplied by the build trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub id: String,
    pub message: String,
}

/// The build that completed and the build it should be diffed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub id: String,
    pub action_step_id: String,
    pub resource_id: String,
    /// Empty or absent on the first build of a resource.
    #[serde(default)]
    pub previous_build_id: Option<String>,
}

/// Target repository and the installation allowed to write to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    pub owner: String,
    pub name: String,
    pub installation_id: String,
}

/// "Build completed" event asking the pipeline to commit the build's changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub commit: CommitInfo,
    pub build: BuildInfo,
    pub repository: RepositoryInfo,
}

impl CommitRequest {
    /// Decode a request from a raw JSON payload.
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// The build to diff against, or `None` for an initial snapshot.
    pub fn previous_build_id(&self) -> Option<&str> {
        self.build
            .previous_build_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn build_id(&self) -> &str {
        &self.build.id
    }

    pub fn action_step_id(&self) -> &str {
        &self.build.action_step_id
    }

    /// `owner/name` of the target repository.
    pub fn repository_slug(&self) -> String {
        format!("{}/{}", self.repository.owner, self.repository.name)
    }
}
