//! Client for the external diff service.
//!
//! `POST {base_url}/diff` with `{resourceId, previousBuildId, currentBuildId}`
//! answers `[{path, code}]`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::{coalesce_changed_files, DiffResolver};
use crate::config::{env_lookup, parse_or, ConfigError};
use crate::domain::{ChangedFile, PipelineError, Result};

/// Diff service connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct DiffServiceConfig {
    /// Base URL, e.g. `http://diff-service:8080`
    pub base_url: String,
    /// Optional bearer token
    pub token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl std::fmt::Debug for DiffServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffServiceConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl DiffServiceConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            timeout_secs: 30,
        }
    }

    /// Read `BUILDCOMMIT_DIFF_SERVICE_URL` (required),
    /// `BUILDCOMMIT_DIFF_SERVICE_TOKEN` and `BUILDCOMMIT_DIFF_SERVICE_TIMEOUT_SECS`.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let base_url = env_lookup("BUILDCOMMIT_DIFF_SERVICE_URL")
            .ok_or_else(|| ConfigError::Missing("BUILDCOMMIT_DIFF_SERVICE_URL".to_string()))?;
        let mut config = Self::new(&base_url);
        config.token = env_lookup("BUILDCOMMIT_DIFF_SERVICE_TOKEN");
        config.timeout_secs = parse_or(
            &env_lookup,
            "BUILDCOMMIT_DIFF_SERVICE_TIMEOUT_SECS",
            config.timeout_secs,
        )?;
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiffQuery<'a> {
    resource_id: &'a str,
    previous_build_id: Option<&'a str>,
    current_build_id: &'a str,
}

/// HTTP diff resolver backed by the external diff service.
pub struct DiffServiceClient {
    client: Client,
    config: DiffServiceConfig,
}

impl DiffServiceClient {
    /// Create a new diff service client.
    pub fn new(config: DiffServiceConfig) -> std::result::Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("buildcommit/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn diff_url(&self) -> String {
        format!("{}/diff", self.config.base_url)
    }
}

/// Map a non-success diff service response to a pipeline fault.
pub(crate) fn status_fault(status: StatusCode, body: &str) -> PipelineError {
    let detail = body.trim();
    if status == StatusCode::NOT_FOUND {
        let detail = if detail.is_empty() {
            "build artifact not found"
        } else {
            detail
        };
        return PipelineError::DiffUnavailable(detail.to_string());
    }
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return PipelineError::DiffUnavailable(format!(
            "diff service unavailable ({})",
            status.as_u16()
        ));
    }
    PipelineError::DiffComputationError(format!(
        "diff service returned {}: {}",
        status.as_u16(),
        detail
    ))
}

fn transport_fault(err: reqwest::Error) -> PipelineError {
    if err.is_timeout() || err.is_connect() {
        PipelineError::DiffUnavailable(format!(
            "diff service unreachable: {}",
            err.without_url()
        ))
    } else {
        PipelineError::DiffComputationError(format!(
            "diff service request failed: {}",
            err.without_url()
        ))
    }
}

#[async_trait]
impl DiffResolver for DiffServiceClient {
    #[instrument(skip(self), name = "diff_service", level = "debug")]
    async fn compute_changed_files(
        &self,
        resource_id: &str,
        previous_build_id: Option<&str>,
        current_build_id: &str,
    ) -> Result<Vec<ChangedFile>> {
        let query = DiffQuery {
            resource_id,
            previous_build_id,
            current_build_id,
        };

        let mut request = self.client.post(self.diff_url()).json(&query);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_fault)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Diff service error");
            return Err(status_fault(status, &body));
        }

        let files: Vec<ChangedFile> = response.json().await.map_err(|e| {
            PipelineError::DiffComputationError(format!(
                "diff service returned an unreadable body: {}",
                e.without_url()
            ))
        })?;
        debug!(files = files.len(), "Diff service answered");
        Ok(coalesce_changed_files(files))
    }
}
