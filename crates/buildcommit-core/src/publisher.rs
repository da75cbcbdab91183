//! Status publishing: the pipeline's final output.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::bus::MessageProducer;
use crate::domain::{CommitStatus, PipelineError, Result};

/// Emits terminal commit statuses.
///
/// A publish failure has no further downstream; callers must record it
/// through logs and metrics.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, build_id: &str, status: &CommitStatus) -> Result<()>;
}

/// Publishes statuses as JSON onto a topic, keyed by build id.
pub struct BusStatusPublisher<P: MessageProducer + ?Sized> {
    producer: Arc<P>,
    topic: String,
}

impl<P: MessageProducer + ?Sized> BusStatusPublisher<P> {
    pub fn new(producer: Arc<P>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl<P: MessageProducer + ?Sized + 'static> StatusPublisher for BusStatusPublisher<P> {
    async fn publish(&self, build_id: &str, status: &CommitStatus) -> Result<()> {
        let value = status.to_json_bytes().map_err(|e| {
            PipelineError::PublishFailed(format!(
                "failed to encode status for build {build_id}: {e}"
            ))
        })?;
        self.producer
            .emit(&self.topic, build_id, value)
            .await
            .map_err(|e| {
                PipelineError::PublishFailed(format!(
                    "failed to publish status for build {build_id} to {}: {e}",
                    self.topic
                ))
            })?;
        debug!(build_id, topic = %self.topic, outcome = ?status.outcome(), "Status emitted");
        Ok(())
    }
}
