//! Diff over build snapshots held in an injected artifact store.

use std::sync::Arc;

use async_trait::async_trait;
use build_artifacts::{ArtifactStore, BuildSnapshot, StorageError};
use tracing::{debug, instrument};

use super::DiffResolver;
use crate::domain::{ChangedFile, PipelineError, Result};

/// Compares two build snapshots by content digest.
///
/// Added and modified files are reported with their current content.
/// Files removed in the current build are not part of the change set.
pub struct ArtifactDiffResolver<S: ArtifactStore> {
    store: Arc<S>,
}

impl<S: ArtifactStore> ArtifactDiffResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn load(&self, resource_id: &str, build_id: &str) -> Result<BuildSnapshot> {
        self.store
            .load_build(resource_id, build_id)
            .await
            .map_err(storage_fault)
    }
}

fn storage_fault(err: StorageError) -> PipelineError {
    match err {
        StorageError::BuildNotFound { .. } | StorageError::InvalidPath { .. } => {
            PipelineError::DiffUnavailable(err.to_string())
        }
        other => {
            PipelineError::DiffComputationError(format!("failed to read build artifact: {other}"))
        }
    }
}

/// Files of `current` that are new or differ from `previous`, in path order.
pub fn changed_between(
    previous: Option<&BuildSnapshot>,
    current: &BuildSnapshot,
) -> Vec<ChangedFile> {
    current
        .files()
        .filter(|file| match previous.and_then(|p| p.get(&file.path)) {
            Some(before) => before.digest() != file.digest(),
            None => true,
        })
        .map(|file| ChangedFile::new(file.path.clone(), file.content.clone()))
        .collect()
}

#[async_trait]
impl<S: ArtifactStore + 'static> DiffResolver for ArtifactDiffResolver<S> {
    #[instrument(skip(self), name = "artifact_diff", level = "debug")]
    async fn compute_changed_files(
        &self,
        resource_id: &str,
        previous_build_id: Option<&str>,
        current_build_id: &str,
    ) -> Result<Vec<ChangedFile>> {
        let current = self.load(resource_id, current_build_id).await?;
        let previous = match previous_build_id {
            Some(id) => Some(self.load(resource_id, id).await?),
            None => None,
        };

        let changed = changed_between(previous.as_ref(), &current);
        debug!(
            total = current.len(),
            changed = changed.len(),
            "Compared build snapshots"
        );
        Ok(changed)
    }
}
