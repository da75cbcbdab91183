//! Storage trait definitions for build artifacts
//!
//! The pipeline only needs narrow "collection access" to build snapshots:
//! load the files of one build, check that a build exists, and (for
//! producers and tests) store a build. `ArtifactStore` is that interface;
//! backends are injected, never extended.
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Build snapshots
// ---------------------------------------------------------------------------

/// One tracked file of a build artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// Repository-relative path, `/`-separated.
    pub path: String,
    /// Text content of the file.
    pub content: String,
}

impl ArtifactFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// SHA-256 of the file content.
    pub fn digest(&self) -> ContentDigest {
        ContentDigest::from_bytes(self.content.as_bytes())
    }
}

/// Complete file set of one build, keyed by path.
///
/// Paths are unique: constructing a snapshot from a list that repeats a
/// path keeps the last occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSnapshot {
    resource_id: String,
    build_id: String,
    files: BTreeMap<String, ArtifactFile>,
}

impl BuildSnapshot {
    pub fn new(
        resource_id: impl Into<String>,
        build_id: impl Into<String>,
        files: impl IntoIterator<Item = ArtifactFile>,
    ) -> Self {
        let files = files
            .into_iter()
            .map(|f| (f.path.clone(), f))
            .collect::<BTreeMap<_, _>>();
        Self {
            resource_id: resource_id.into(),
            build_id: build_id.into(),
            files,
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    /// Files in path order.
    pub fn files(&self) -> impl Iterator<Item = &ArtifactFile> {
        self.files.values()
    }

    /// Look up a single file by path.
    pub fn get(&self, path: &str) -> Option<&ArtifactFile> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Check that `path` is a non-empty relative path without `..` segments.
///
/// Applied to resource ids, build ids and file paths before they touch a
/// backend, so nothing can address storage outside its root.
pub fn validate_relative_path(path: &str) -> StorageResult<()> {
    let invalid = || StorageError::InvalidPath {
        path: path.to_string(),
    };
    if path.trim().is_empty() {
        return Err(invalid());
    }
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(invalid()),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

/// Collection access to build artifact snapshots.
///
/// Guarantees:
/// - `load_build` returns `StorageError::BuildNotFound` for an unknown build.
/// - a loaded snapshot never contains two files with the same path.
/// - `put_build` replaces the whole snapshot; readers never observe a
///   partially written build.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Load every tracked file of a build.
    async fn load_build(&self, resource_id: &str, build_id: &str) -> StorageResult<BuildSnapshot>;

    /// Whether a snapshot exists for this build.
    async fn contains_build(&self, resource_id: &str, build_id: &str) -> StorageResult<bool>;

    /// Store (or replace) the snapshot of a build.
    async fn put_build(
        &self,
        resource_id: &str,
        build_id: &str,
        files: Vec<ArtifactFile>,
    ) -> StorageResult<()>;
}
