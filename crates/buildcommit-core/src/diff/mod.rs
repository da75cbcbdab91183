//! Diff resolution: which files changed between two builds of a resource.
//!
//! - `ArtifactDiffResolver` compares snapshots held in an `ArtifactStore`
//! - `DiffServiceClient` delegates to the external diff service over HTTP

pub mod artifact;
pub mod service;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::{ChangedFile, Result};

pub use artifact::ArtifactDiffResolver;
pub use service::{DiffServiceClient, DiffServiceConfig};

/// Computes the changed-file set between two builds.
///
/// Implementations must:
/// - report the full file set of `current_build_id` when
///   `previous_build_id` is `None`;
/// - fail with `DiffUnavailable` when a build cannot be located and with
///   `DiffComputationError` for any other comparison fault;
/// - return each path at most once, in a deterministic order.
#[async_trait]
pub trait DiffResolver: Send + Sync {
    async fn compute_changed_files(
        &self,
        resource_id: &str,
        previous_build_id: Option<&str>,
        current_build_id: &str,
    ) -> Result<Vec<ChangedFile>>;
}

/// Collapse repeated paths to their last reported content, sorted by path.
pub fn coalesce_changed_files(files: Vec<ChangedFile>) -> Vec<ChangedFile> {
    let mut by_path = BTreeMap::new();
    for file in files {
        by_path.insert(file.path.clone(), file);
    }
    by_path.into_values().collect()
}
