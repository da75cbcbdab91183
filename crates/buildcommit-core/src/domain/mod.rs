//! Domain models for buildcommit.
//!
//! Canonical definitions for the pipeline's data:
//! - `CommitRequest`: inbound "build completed, please commit" event
//! - `ChangedFile` / `FileChange`: diff output and repository input
//! - `CommitContext`: correlation identifiers derived from a request
//! - `CommitStatus`: the single terminal status emitted per request

pub mod change;
pub mod context;
pub mod error;
pub mod request;
pub mod status;

pub use change::{ChangedFile, FileChange};
pub use context::CommitContext;
pub use error::{PipelineError, Result, Stage};
pub use request::{BuildInfo, CommitInfo, CommitRequest, RepositoryInfo};
pub use status::{CommitOutcome, CommitSha, CommitStatus, InvalidCommitSha, StatusPayload};
