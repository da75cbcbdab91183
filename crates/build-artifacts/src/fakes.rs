//! In-memory fake for `ArtifactStore` (testing only)
//!
//! `MemoryArtifactStore` satisfies the trait contract without touching the
//! filesystem.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

/// In-memory artifact store backed by a `HashMap<(resource, build), snapshot>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    builds: Mutex<HashMap<(String, String), BuildSnapshot>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper for seeding fixtures.
    pub fn with_build(
        self,
        resource_id: &str,
        build_id: &str,
        files: impl IntoIterator<Item = (&'static str, &'static str)>,
    ) -> Self {
        let snapshot = BuildSnapshot::new(
            resource_id,
            build_id,
            files.into_iter().map(|(p, c)| ArtifactFile::new(p, c)),
        );
        self.builds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((resource_id.to_string(), build_id.to_string()), snapshot);
        self
    }

    /// Number of stored builds.
    pub fn build_count(&self) -> usize {
        self.builds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn load_build(&self, resource_id: &str, build_id: &str) -> StorageResult<BuildSnapshot> {
        let builds = self.builds.lock().unwrap_or_else(PoisonError::into_inner);
        builds
            .get(&(resource_id.to_string(), build_id.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::BuildNotFound {
                resource_id: resource_id.to_string(),
                build_id: build_id.to_string(),
            })
    }

    async fn contains_build(&self, resource_id: &str, build_id: &str) -> StorageResult<bool> {
        let builds = self.builds.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(builds.contains_key(&(resource_id.to_string(), build_id.to_string())))
    }

    async fn put_build(
        &self,
        resource_id: &str,
        build_id: &str,
        files: Vec<ArtifactFile>,
    ) -> StorageResult<()> {
        for file in &files {
            validate_relative_path(&file.path)?;
        }
        let snapshot = BuildSnapshot::new(resource_id, build_id, files);
        let mut builds = self.builds.lock().unwrap_or_else(PoisonError::into_inner);
        builds.insert((resource_id.to_string(), build_id.to_string()), snapshot);
        Ok(())
    }
}
