//! Structured observability hooks for the request lifecycle.
//!
//! This module provides:
//! - an execution-scoped tracing span (attach with `tracing::Instrument`)
//! - emission functions for the lifecycle events of one request
//!
//! Events are emitted at `info!` level, failures at `warn!`/`error!`.
//! For JSON output, run the daemon with `--json`.

use tracing::{error, info, warn};

use crate::domain::PipelineError;

/// Span covering one execution of one inbound message.
///
/// Redeliveries of the same request get a fresh `execution_id`.
///
/// ```ignore
/// async { /* dispatch */ }.instrument(execution_span(&id, "b2")).await;
/// ```
pub fn execution_span(execution_id: &str, build_id: &str) -> tracing::Span {
    tracing::info_span!("buildcommit.execution", execution_id = %execution_id, build_id = %build_id)
}

/// Emit event: request consumed from the inbound topic.
pub fn emit_request_received(build_id: &str, partition: usize, offset: u64) {
    info!(event = "request.received", build_id = %build_id, partition, offset);
}

/// Emit event: diff resolved with the number of changed files.
pub fn emit_diff_resolved(build_id: &str, changed_files: usize, initial: bool) {
    info!(
        event = "diff.resolved",
        build_id = %build_id,
        changed_files,
        initial_snapshot = initial,
    );
}

/// Emit event: commit created on the repository host.
pub fn emit_commit_created(build_id: &str, repository: &str, commit_sha: &str) {
    info!(
        event = "commit.created",
        build_id = %build_id,
        repository = %repository,
        commit_sha = %commit_sha,
    );
}

/// Emit event: a stage failed and the request will terminate as Failed.
pub fn emit_stage_failed(build_id: &str, error: &PipelineError) {
    warn!(
        event = "stage.failed",
        build_id = %build_id,
        stage = %error.stage(),
        kind = error.kind(),
        error = %error,
    );
}

/// Emit event: terminal status published.
pub fn emit_status_published(build_id: &str, success: bool, duration_ms: u64) {
    info!(
        event = "status.published",
        build_id = %build_id,
        success,
        duration_ms,
    );
}

/// Emit event: terminal status could not be published. The request's only
/// audit trail is this log line.
pub fn emit_status_publish_failed(
    build_id: &str,
    action_step_id: &str,
    error: &dyn std::fmt::Display,
) {
    error!(
        event = "status.publish_failed",
        build_id = %build_id,
        action_step_id = %action_step_id,
        error = %error,
    );
}

/// Emit event: inbound payload could not be decoded.
pub fn emit_request_malformed(
    key: &str,
    partition: usize,
    offset: u64,
    error: &dyn std::fmt::Display,
) {
    error!(
        event = "request.malformed",
        key = %key,
        partition,
        offset,
        error = %error,
    );
}
