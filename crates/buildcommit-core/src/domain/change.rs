//! File change shapes flowing from the diff into the commit.

use serde::{Deserialize, Serialize};

/// A file that changed between two builds, as reported by the diff.
///
/// The external diff service names the content field `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    #[serde(rename = "code", alias = "content")]
    pub content: String,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A file to write in the commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub content: String,
}
