//! Pipeline error taxonomy.
//!
//! Each variant's message is the text that ends up in a Failed
//! `CommitStatus`, so it must never contain credentials.

use std::fmt;

/// Pipeline stage a fault originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Diff,
    Commit,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Diff => "diff",
            Stage::Commit => "commit",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Faults raised by the pipeline's collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// A build artifact could not be located, or the diff source is unreachable.
    #[error("{0}")]
    DiffUnavailable(String),

    /// The diff source failed while comparing two builds.
    #[error("{0}")]
    DiffComputationError(String),

    /// The installation credential could not be obtained or was rejected.
    #[error("{0}")]
    AuthenticationFailed(String),

    /// The commit could not be created; the target ref is untouched.
    #[error("{0}")]
    CommitFailed(String),

    /// The commit would carry no file delta and empty commits are rejected.
    #[error("{0}")]
    EmptyCommit(String),

    /// The terminal status could not be emitted.
    #[error("{0}")]
    PublishFailed(String),
}

impl PipelineError {
    /// Stage the fault belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::DiffUnavailable(_) | PipelineError::DiffComputationError(_) => {
                Stage::Diff
            }
            PipelineError::AuthenticationFailed(_)
            | PipelineError::CommitFailed(_)
            | PipelineError::EmptyCommit(_) => Stage::Commit,
            PipelineError::PublishFailed(_) => Stage::Publish,
        }
    }

    /// Stable name of the variant, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::DiffUnavailable(_) => "diff_unavailable",
            PipelineError::DiffComputationError(_) => "diff_computation_error",
            PipelineError::AuthenticationFailed(_) => "authentication_failed",
            PipelineError::CommitFailed(_) => "commit_failed",
            PipelineError::EmptyCommit(_) => "empty_commit",
            PipelineError::PublishFailed(_) => "publish_failed",
        }
    }

    /// User-facing message.
    pub fn message(&self) -> &str {
        match self {
            PipelineError::DiffUnavailable(m)
            | PipelineError::DiffComputationError(m)
            | PipelineError::AuthenticationFailed(m)
            | PipelineError::CommitFailed(m)
            | PipelineError::EmptyCommit(m)
            | PipelineError::PublishFailed(m) => m,
        }
    }
}

/// Result type for pipeline stages.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_bare_message() {
        let err = PipelineError::DiffUnavailable("artifact not found".to_string());
        assert_eq!(err.to_string(), "artifact not found");
        assert_eq!(err.message(), "artifact not found");
    }

    #[test]
    fn stages_follow_variants() {
        assert_eq!(
            PipelineError::DiffComputationError("x".into()).stage(),
            Stage::Diff
        );
        assert_eq!(
            PipelineError::AuthenticationFailed("x".into()).stage(),
            Stage::Commit
        );
        assert_eq!(PipelineError::EmptyCommit("x".into()).stage(), Stage::Commit);
        assert_eq!(
            PipelineError::PublishFailed("x".into()).stage(),
            Stage::Publish
        );
        assert_eq!(Stage::Commit.to_string(), "commit");
    }

    #[test]
    fn kinds_are_distinct() {
        let kinds = [
            PipelineError::DiffUnavailable(String::new()).kind(),
            PipelineError::DiffComputationError(String::new()).kind(),
            PipelineError::AuthenticationFailed(String::new()).kind(),
            PipelineError::CommitFailed(String::new()).kind(),
            PipelineError::EmptyCommit(String::new()).kind(),
            PipelineError::PublishFailed(String::new()).kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
