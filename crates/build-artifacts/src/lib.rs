//! Build-Artifacts: snapshot storage for buildcommit
//!
//! This crate holds the files produced by each build of a resource so the
//! pipeline can diff two builds and commit what changed.
//!
//! ## Key Components
//!
//! - `ArtifactStore`: narrow collection-access trait over build snapshots
//! - `FsArtifactStore`: directory-per-build filesystem backend
//! - `MemoryArtifactStore` (in `fakes`): in-memory backend for tests
//! - `ContentDigest`: SHA-256 content addressing used for change detection

mod error;
pub mod fakes;
mod fs_store;
pub mod storage_traits;

pub use error::StorageError;
pub use fs_store::FsArtifactStore;
pub use storage_traits::{
    validate_relative_path, ArtifactFile, ArtifactStore, BuildSnapshot, ContentDigest,
    StorageResult,
};

/// Result type for build-artifacts operations
pub type Result<T> = std::result::Result<T, StorageError>;
