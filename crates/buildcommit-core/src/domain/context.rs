//! Commit context: the identifiers that address and describe one commit.

use serde::{Deserialize, Serialize};

use super::request::CommitRequest;

/// Correlation context derived from a [`CommitRequest`].
///
/// A pure projection of the request; see [`crate::assembler::assemble`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitContext {
    pub owner: String,
    pub commit_id: String,
    pub repo: String,
    pub resource_name: String,
    pub resource_id: String,
    pub build_id: String,
    pub action_step_id: String,
}

impl From<&CommitRequest> for CommitContext {
    fn from(request: &CommitRequest) -> Self {
        Self {
            owner: request.repository.owner.clone(),
            commit_id: request.commit.id.clone(),
            repo: request.repository.name.clone(),
            // Requests carry no display name; the resource id stands in for it.
            resource_name: request.build.resource_id.clone(),
            resource_id: request.build.resource_id.clone(),
            build_id: request.build.id.clone(),
            action_step_id: request.build.action_step_id.clone(),
        }
    }
}
