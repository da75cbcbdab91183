//! Request dispatcher: drives one commit request through diff, assembly,
//! commit and publish, and guarantees exactly one terminal status.
//!
//! Every stage result is folded into a single [`CommitStatus`] before the
//! publisher is invoked, so no fault path can skip or repeat the publish.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

use crate::assembler::{assemble, to_file_changes};
use crate::bus::{Message, PartitionReceiver};
use crate::config::PipelineConfig;
use crate::diff::DiffResolver;
use crate::domain::{CommitRequest, CommitSha, CommitStatus, PipelineError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::publisher::StatusPublisher;
use crate::repository::RepositoryClient;

/// Lifecycle of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    Diffing,
    Assembling,
    Committing,
    Publishing,
    TerminatedSuccess,
    TerminatedFailure,
}

impl DispatchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DispatchState::TerminatedSuccess | DispatchState::TerminatedFailure
        )
    }
}

/// Summary of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Fresh per execution; a redelivered request gets a new one.
    pub execution_id: Uuid,
    /// `None` only for payloads whose build id could not be recovered.
    pub build_id: Option<String>,
    pub terminal: DispatchState,
    /// Whether the terminal status reached the publisher.
    pub published: bool,
}

/// Orchestrates the pipeline stages for inbound commit requests.
pub struct RequestDispatcher {
    config: PipelineConfig,
    diff: Arc<dyn DiffResolver>,
    repository: Arc<dyn RepositoryClient>,
    publisher: Arc<dyn StatusPublisher>,
}

async fn bounded<T, F>(
    limit: Duration,
    call: F,
    on_timeout: impl FnOnce() -> PipelineError,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

fn advance(state: &mut DispatchState, next: DispatchState, build_id: &str) {
    debug!(build_id, from = ?*state, to = ?next, "Dispatch state changed");
    *state = next;
}

impl RequestDispatcher {
    pub fn new(
        config: PipelineConfig,
        diff: Arc<dyn DiffResolver>,
        repository: Arc<dyn RepositoryClient>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        Self {
            config,
            diff,
            repository,
            publisher,
        }
    }

    /// Decode and process one inbound message.
    pub async fn handle_message(&self, message: Message) -> DispatchReport {
        METRICS.inc_requests_received();
        match CommitRequest::from_slice(&message.value) {
            Ok(request) => {
                obs::emit_request_received(request.build_id(), message.partition, message.offset);
                self.handle_request(&request).await
            }
            Err(err) => self.handle_malformed(&message, &err).await,
        }
    }

    /// Run one decoded request to its terminal status.
    pub async fn handle_request(&self, request: &CommitRequest) -> DispatchReport {
        let execution_id = Uuid::new_v4();
        let span = obs::execution_span(&execution_id.to_string(), request.build_id());
        self.execute(execution_id, request).instrument(span).await
    }

    async fn execute(&self, execution_id: Uuid, request: &CommitRequest) -> DispatchReport {
        let started = Instant::now();
        let build_id = request.build_id();
        let mut state = DispatchState::Received;

        let status = match self.run_stages(request, &mut state).await {
            Ok(sha) => {
                METRICS.inc_commits_succeeded();
                CommitStatus::success(
                    request.action_step_id(),
                    &request.repository.owner,
                    &request.repository.name,
                    sha,
                )
            }
            Err(err) => {
                METRICS.inc_commits_failed();
                obs::emit_stage_failed(build_id, &err);
                CommitStatus::from_error(request.action_step_id(), &err)
            }
        };

        advance(&mut state, DispatchState::Publishing, build_id);
        let published = self.publish(build_id, &status, started).await;
        let terminal = if status.is_success() {
            DispatchState::TerminatedSuccess
        } else {
            DispatchState::TerminatedFailure
        };
        advance(&mut state, terminal, build_id);

        DispatchReport {
            execution_id,
            build_id: Some(build_id.to_string()),
            terminal,
            published,
        }
    }

    async fn run_stages(
        &self,
        request: &CommitRequest,
        state: &mut DispatchState,
    ) -> Result<CommitSha> {
        let build_id = request.build_id();
        let timeouts = self.config.timeouts;

        advance(state, DispatchState::Diffing, build_id);
        let previous = request.previous_build_id();
        let changed = bounded(
            timeouts.diff,
            self.diff
                .compute_changed_files(&request.build.resource_id, previous, build_id),
            || {
                PipelineError::DiffUnavailable(format!(
                    "diff for build {build_id} timed out after {}s",
                    timeouts.diff.as_secs()
                ))
            },
        )
        .await?;
        obs::emit_diff_resolved(build_id, changed.len(), previous.is_none());

        advance(state, DispatchState::Assembling, build_id);
        let context = assemble(request);
        let files = to_file_changes(changed);

        advance(state, DispatchState::Committing, build_id);
        let sha = bounded(
            timeouts.commit,
            self.repository.create_commit(
                &request.repository.installation_id,
                &context,
                &request.commit.message,
                files,
            ),
            || {
                PipelineError::CommitFailed(format!(
                    "commit to {} timed out after {}s",
                    request.repository_slug(),
                    timeouts.commit.as_secs()
                ))
            },
        )
        .await?;
        obs::emit_commit_created(build_id, &request.repository_slug(), sha.as_str());
        Ok(sha)
    }

    /// Publish the terminal status once. Failures end here: they are logged
    /// and counted, never retried.
    async fn publish(&self, build_id: &str, status: &CommitStatus, started: Instant) -> bool {
        let limit = self.config.timeouts.publish;
        let result = bounded(limit, self.publisher.publish(build_id, status), || {
            PipelineError::PublishFailed(format!(
                "publishing status for build {build_id} timed out after {}s",
                limit.as_secs()
            ))
        })
        .await;
        match result {
            Ok(()) => {
                obs::emit_status_published(
                    build_id,
                    status.is_success(),
                    started.elapsed().as_millis() as u64,
                );
                true
            }
            Err(err) => {
                METRICS.inc_publish_failures();
                obs::emit_status_publish_failed(build_id, status.action_step_id(), &err);
                false
            }
        }
    }

    async fn handle_malformed(&self, message: &Message, err: &serde_json::Error) -> DispatchReport {
        let execution_id = Uuid::new_v4();
        METRICS.inc_malformed_messages();
        obs::emit_request_malformed(&message.key, message.partition, message.offset, err);

        let Some((build_id, action_step_id)) = recover_identifiers(&message.value) else {
            return DispatchReport {
                execution_id,
                build_id: None,
                terminal: DispatchState::TerminatedFailure,
                published: false,
            };
        };

        let span = obs::execution_span(&execution_id.to_string(), &build_id);
        let status =
            CommitStatus::failed(action_step_id, format!("malformed commit request: {err}"));
        let published = self
            .publish(&build_id, &status, Instant::now())
            .instrument(span)
            .await;
        DispatchReport {
            execution_id,
            build_id: Some(build_id),
            terminal: DispatchState::TerminatedFailure,
            published,
        }
    }

    /// Consume every partition until its topic closes.
    ///
    /// One task per partition; messages within a partition are handled
    /// strictly in order. Returns the number of messages handled.
    pub async fn run(self: Arc<Self>, receivers: Vec<PartitionReceiver>) -> u64 {
        let consumers = receivers.into_iter().map(|mut rx| {
            let dispatcher = Arc::clone(&self);
            tokio::spawn(async move {
                let partition = rx.partition();
                let mut handled = 0u64;
                while let Some(message) = rx.recv().await {
                    dispatcher.handle_message(message).await;
                    handled += 1;
                }
                debug!(partition, handled, "Partition drained");
                handled
            })
        });

        let mut total = 0;
        for joined in join_all(consumers).await {
            match joined {
                Ok(handled) => total += handled,
                Err(e) => error!(error = %e, "Partition consumer task failed"),
            }
        }
        info!(handled = total, "Dispatcher stopped");
        total
    }
}

/// Recover `build.id` and `build.actionStepId` from a payload that did not
/// decode as a request.
fn recover_identifiers(payload: &[u8]) -> Option<(String, String)> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    let build = value.get("build")?;
    let build_id = build.get("id")?.as_str()?;
    if build_id.trim().is_empty() {
        return None;
    }
    let action_step_id = build
        .get("actionStepId")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some((build_id.to_string(), action_step_id.to_string()))
}
