//! Error types for build-artifacts

use thiserror::Error;

/// Errors that can occur in the artifact storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// No snapshot is stored for this build
    #[error("build artifact not found: {resource_id}/{build_id}")]
    BuildNotFound {
        resource_id: String,
        build_id: String,
    },

    /// Identifier or file path would escape the store root
    #[error("invalid artifact path: {path}")]
    InvalidPath { path: String },

    /// Stored file is not valid UTF-8 text
    #[error("artifact file is not valid UTF-8: {path}")]
    NonUtf8 { path: String },

    /// Underlying filesystem failure
    #[error("artifact storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether this error means the requested build does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::BuildNotFound { .. })
    }
}
