//! buildcommit core library
//!
//! Consumes "build completed" commit requests, resolves the files that
//! changed since the previous build, commits them to the target repository
//! and publishes exactly one terminal status per request.
//!
//! ## Components
//!
//! - `diff`: Diff Resolver (`ArtifactDiffResolver`, `DiffServiceClient`)
//! - `assembler`: pure Commit Assembler
//! - `repository`: Repository Client (`GitDataClient`) and authenticators
//! - `publisher`: Status Publisher (`BusStatusPublisher`)
//! - `dispatcher`: Request Dispatcher driving the stages per message
//! - `bus`: in-process partitioned topics

pub mod assembler;
pub mod bus;
pub mod config;
pub mod diff;
pub mod dispatcher;
pub mod domain;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod publisher;
pub mod repository;
pub mod telemetry;

#[cfg(test)]
mod test_host;

pub use assembler::{assemble, to_file_changes};
pub use bus::{partition_for, BusError, InMemoryBus, Message, MessageProducer, PartitionReceiver};
pub use config::{
    ConfigError, PipelineConfig, StageTimeouts, DEFAULT_INBOUND_TOPIC, DEFAULT_STATUS_TOPIC,
};
pub use diff::{ArtifactDiffResolver, DiffResolver, DiffServiceClient, DiffServiceConfig};
pub use dispatcher::{DispatchReport, DispatchState, RequestDispatcher};
pub use domain::{
    BuildInfo, ChangedFile, CommitContext, CommitInfo, CommitOutcome, CommitRequest, CommitSha,
    CommitStatus, FileChange, PipelineError, RepositoryInfo, Result, Stage, StatusPayload,
};
pub use publisher::{BusStatusPublisher, StatusPublisher};
pub use repository::{
    EmptyCommitPolicy, GitDataClient, HttpTokenBroker, InstallationAuthenticator,
    InstallationToken, RepositoryClient, RepositoryHostConfig, StaticTokenAuthenticator,
    TokenBrokerConfig,
};

/// Crate version, reported by the daemon.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
