//! Process configuration for the pipeline.
//!
//! Topic names and tunables are carried in explicit structs handed to the
//! dispatcher and clients at construction. Each struct has a `Default`
//! and a `from_env` constructor reading `BUILDCOMMIT_*` variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Inbound topic carrying commit requests.
pub const DEFAULT_INBOUND_TOPIC: &str = "git.internal.create-commit.request.0";

/// Outbound topic carrying commit statuses.
pub const DEFAULT_STATUS_TOPIC: &str = "git.internal.commit-state.request.0";

/// Configuration parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("missing required setting: {0}")]
    Missing(String),
}

/// Read `key` through `lookup` and parse it, falling back to `default`.
pub(crate) fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

pub(crate) fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Per-stage bounds on external calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimeouts {
    pub diff: Duration,
    pub commit: Duration,
    pub publish: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            diff: Duration::from_secs(60),
            commit: Duration::from_secs(120),
            publish: Duration::from_secs(15),
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Topic commit requests are consumed from.
    pub inbound_topic: String,
    /// Topic statuses are produced to.
    pub status_topic: String,
    /// Partitions per topic on the in-process bus.
    pub partitions: usize,
    /// Buffered messages per partition before producers wait.
    pub channel_capacity: usize,
    pub timeouts: StageTimeouts,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inbound_topic: DEFAULT_INBOUND_TOPIC.to_string(),
            status_topic: DEFAULT_STATUS_TOPIC.to_string(),
            partitions: 4,
            channel_capacity: 64,
            timeouts: StageTimeouts::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Create a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let partitions = parse_or(&lookup, "BUILDCOMMIT_PARTITIONS", defaults.partitions)?;
        if partitions == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BUILDCOMMIT_PARTITIONS".to_string(),
                value: "0".to_string(),
                reason: "at least one partition is required".to_string(),
            });
        }
        let channel_capacity = parse_or(
            &lookup,
            "BUILDCOMMIT_CHANNEL_CAPACITY",
            defaults.channel_capacity,
        )?
        .max(1);

        let timeouts = StageTimeouts {
            diff: Duration::from_secs(parse_or(
                &lookup,
                "BUILDCOMMIT_DIFF_TIMEOUT_SECS",
                defaults.timeouts.diff.as_secs(),
            )?),
            commit: Duration::from_secs(parse_or(
                &lookup,
                "BUILDCOMMIT_COMMIT_TIMEOUT_SECS",
                defaults.timeouts.commit.as_secs(),
            )?),
            publish: Duration::from_secs(parse_or(
                &lookup,
                "BUILDCOMMIT_PUBLISH_TIMEOUT_SECS",
                defaults.timeouts.publish.as_secs(),
            )?),
        };

        Ok(Self {
            inbound_topic: lookup("BUILDCOMMIT_INBOUND_TOPIC").unwrap_or(defaults.inbound_topic),
            status_topic: lookup("BUILDCOMMIT_STATUS_TOPIC").unwrap_or(defaults.status_topic),
            partitions,
            channel_capacity,
            timeouts,
        })
    }

    /// Set per-stage timeouts.
    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the partition count.
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_standard_topics() {
        let config = PipelineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.inbound_topic, "git.internal.create-commit.request.0");
        assert_eq!(config.status_topic, "git.internal.commit-state.request.0");
    }

    #[test]
    fn overrides_are_applied() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("BUILDCOMMIT_INBOUND_TOPIC", "in"),
            ("BUILDCOMMIT_STATUS_TOPIC", "out"),
            ("BUILDCOMMIT_PARTITIONS", "8"),
            ("BUILDCOMMIT_DIFF_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.inbound_topic, "in");
        assert_eq!(config.status_topic, "out");
        assert_eq!(config.partitions, 8);
        assert_eq!(config.timeouts.diff, Duration::from_secs(5));
        assert_eq!(config.timeouts.commit, StageTimeouts::default().commit);
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = PipelineConfig::from_lookup(lookup_from(&[(
            "BUILDCOMMIT_COMMIT_TIMEOUT_SECS",
            "soon",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("BUILDCOMMIT_COMMIT_TIMEOUT_SECS"));
    }

    #[test]
    fn zero_partitions_rejected() {
        let lookup = lookup_from(&[("BUILDCOMMIT_PARTITIONS", "0")]);
        let err = PipelineConfig::from_lookup(lookup).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
