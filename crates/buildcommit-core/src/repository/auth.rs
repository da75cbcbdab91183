//! Installation authenticators.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{InstallationAuthenticator, InstallationToken};
use crate::config::{env_lookup, parse_or, ConfigError};
use crate::domain::{PipelineError, Result};

// =============================================================================
// Static tokens
// =============================================================================

/// Serves pre-issued installation tokens from a fixed map.
#[derive(Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, String>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for an installation.
    pub fn with_token(mut self, installation_id: &str, token: &str) -> Self {
        self.tokens
            .insert(installation_id.to_string(), token.to_string());
        self
    }

    /// Parse `inst1=token1,inst2=token2`.
    pub fn parse(spec: &str) -> std::result::Result<Self, ConfigError> {
        let mut auth = Self::new();
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (id, token) = pair
                .split_once('=')
                .filter(|(id, token)| !id.trim().is_empty() && !token.trim().is_empty())
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "installation tokens".to_string(),
                    // Only the installation side is echoed back.
                    value: pair.split('=').next().unwrap_or_default().to_string(),
                    reason: "expected `<installation>=<token>`".to_string(),
                })?;
            auth = auth.with_token(id.trim(), token.trim());
        }
        Ok(auth)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl std::fmt::Debug for StaticTokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenAuthenticator")
            .field("installations", &self.tokens.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl InstallationAuthenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, installation_id: &str) -> Result<InstallationToken> {
        self.tokens
            .get(installation_id)
            .map(|token| InstallationToken::new(token.clone(), None))
            .ok_or_else(|| {
                PipelineError::AuthenticationFailed(format!(
                    "no credential configured for installation {installation_id}"
                ))
            })
    }
}

// =============================================================================
// Token broker
// =============================================================================

/// Settings for exchanging an app credential for installation tokens.
#[derive(Clone)]
pub struct TokenBrokerConfig {
    /// Host API URL, e.g. `https://api.github.com`
    pub api_url: String,
    /// Already-issued app bearer credential
    pub app_token: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl std::fmt::Debug for TokenBrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBrokerConfig")
            .field("api_url", &self.api_url)
            .field("app_token", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl TokenBrokerConfig {
    pub fn new(api_url: &str, app_token: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            app_token: app_token.to_string(),
            timeout_secs: 15,
        }
    }

    /// Read `BUILDCOMMIT_API_URL`, `BUILDCOMMIT_APP_TOKEN` (required) and
    /// `BUILDCOMMIT_AUTH_TIMEOUT_SECS`.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let app_token = env_lookup("BUILDCOMMIT_APP_TOKEN")
            .ok_or_else(|| ConfigError::Missing("BUILDCOMMIT_APP_TOKEN".to_string()))?;
        let api_url = env_lookup("BUILDCOMMIT_API_URL")
            .unwrap_or_else(|| "https://api.github.com".to_string());
        let mut config = Self::new(&api_url, &app_token);
        config.timeout_secs =
            parse_or(&env_lookup, "BUILDCOMMIT_AUTH_TIMEOUT_SECS", config.timeout_secs)?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

/// Exchanges the app credential for an installation token over HTTP.
///
/// `POST {api_url}/app/installations/{id}/access_tokens`
pub struct HttpTokenBroker {
    client: Client,
    config: TokenBrokerConfig,
}

impl HttpTokenBroker {
    pub fn new(config: TokenBrokerConfig) -> std::result::Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("buildcommit/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn token_url(&self, installation_id: &str) -> String {
        format!(
            "{}/app/installations/{}/access_tokens",
            self.config.api_url,
            urlencoding::encode(installation_id)
        )
    }
}

fn broker_status_fault(installation_id: &str, status: StatusCode) -> PipelineError {
    let reason = match status {
        StatusCode::UNAUTHORIZED => "app credential rejected",
        StatusCode::FORBIDDEN => "installation access forbidden",
        StatusCode::NOT_FOUND => "installation not found",
        _ => "token exchange failed",
    };
    PipelineError::AuthenticationFailed(format!(
        "authentication failed for installation {installation_id}: {reason} ({})",
        status.as_u16()
    ))
}

#[async_trait]
impl InstallationAuthenticator for HttpTokenBroker {
    #[instrument(skip(self), name = "token_broker", level = "debug")]
    async fn authenticate(&self, installation_id: &str) -> Result<InstallationToken> {
        if installation_id.trim().is_empty() {
            return Err(PipelineError::AuthenticationFailed(
                "authentication failed: installation id is empty".to_string(),
            ));
        }

        let response = self
            .client
            .post(self.token_url(installation_id))
            .bearer_auth(&self.config.app_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                PipelineError::AuthenticationFailed(format!(
                    "authentication failed for installation {installation_id}: {}",
                    e.without_url()
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), installation_id, "Token exchange rejected");
            return Err(broker_status_fault(installation_id, status));
        }

        let body: AccessTokenResponse = response.json().await.map_err(|e| {
            PipelineError::AuthenticationFailed(format!(
                "authentication failed for installation {installation_id}: \
                 unreadable token response ({})",
                e.without_url()
            ))
        })?;

        let token = InstallationToken::new(body.token, body.expires_at);
        if token.secret().is_empty() || token.is_expired_at(Utc::now()) {
            return Err(PipelineError::AuthenticationFailed(format!(
                "authentication failed for installation {installation_id}: \
                 token is empty or already expired"
            )));
        }
        debug!(installation_id, expires_at = ?token.expires_at(), "Installation token issued");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_host::{route, StubHost};

    #[tokio::test]
    async fn static_tokens_resolve_known_installation() {
        let auth = StaticTokenAuthenticator::new().with_token("inst1", "tok1");
        let token = auth.authenticate("inst1").await.unwrap();
        assert_eq!(token.secret(), "tok1");
    }

    #[tokio::test]
    async fn static_tokens_reject_unknown_installation() {
        let auth = StaticTokenAuthenticator::new();
        let err = auth.authenticate("inst9").await.unwrap_err();
        assert!(matches!(err, PipelineError::AuthenticationFailed(_)));
        assert!(err.message().contains("inst9"));
    }

    #[test]
    fn parse_token_spec() {
        let auth = StaticTokenAuthenticator::parse("inst1=a, inst2 = b ,").unwrap();
        assert_eq!(auth.len(), 2);

        let err = StaticTokenAuthenticator::parse("inst1=").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = StaticTokenAuthenticator::parse("=tok_secret").unwrap_err();
        assert!(!err.to_string().contains("tok_secret"));
    }

    #[test]
    fn debug_never_prints_secrets() {
        let auth = StaticTokenAuthenticator::new().with_token("inst1", "tok_secret");
        assert!(!format!("{auth:?}").contains("tok_secret"));

        let config = TokenBrokerConfig::new("https://api.example.com/", "app_secret");
        assert!(!format!("{config:?}").contains("app_secret"));
        assert_eq!(config.api_url, "https://api.example.com");
    }

    #[test]
    fn broker_status_messages_name_the_reason() {
        let err = broker_status_fault("inst1", StatusCode::UNAUTHORIZED);
        assert!(err.message().contains("app credential rejected"));
        assert!(err.message().contains("401"));
        let err = broker_status_fault("inst1", StatusCode::NOT_FOUND);
        assert!(err.message().contains("installation not found"));
    }

    #[test]
    fn token_url_shape() {
        let config = TokenBrokerConfig::new("https://api.example.com", "t");
        let broker = HttpTokenBroker::new(config).unwrap();
        assert_eq!(
            broker.token_url("42"),
            "https://api.example.com/app/installations/42/access_tokens"
        );
        assert_eq!(
            broker.token_url("42/../../admin"),
            "https://api.example.com/app/installations/42%2F..%2F..%2Fadmin/access_tokens"
        );
    }

    fn broker(api_url: &str) -> HttpTokenBroker {
        let mut config = TokenBrokerConfig::new(api_url, "app_secret");
        config.timeout_secs = 2;
        HttpTokenBroker::new(config).unwrap()
    }

    const TOKENS: &str = "/app/installations/inst1/access_tokens";

    #[tokio::test]
    async fn broker_exchanges_app_credential_for_installation_token() {
        let host = StubHost::start(vec![route(
            "POST",
            TOKENS,
            201,
            r#"{"token":"ghs_x","expires_at":"2999-01-01T00:00:00Z"}"#,
        )])
        .await;
        let token = broker(host.url()).authenticate("inst1").await.unwrap();
        assert_eq!(token.secret(), "ghs_x");
        assert!(token.expires_at().is_some());

        let received = host.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].method, "POST");
        assert_eq!(received[0].path, TOKENS);
        assert_eq!(
            received[0].authorization.as_deref(),
            Some("Bearer app_secret")
        );
    }

    #[tokio::test]
    async fn broker_accepts_token_without_expiry() {
        let host = StubHost::start(vec![route(
            "POST",
            TOKENS,
            201,
            r#"{"token":"ghs_x","expires_at":null}"#,
        )])
        .await;
        let token = broker(host.url()).authenticate("inst1").await.unwrap();
        assert_eq!(token.secret(), "ghs_x");
        assert!(token.expires_at().is_none());
    }

    #[tokio::test]
    async fn broker_rejects_expired_or_empty_tokens() {
        for body in [
            r#"{"token":"ghs_x","expires_at":"2000-01-01T00:00:00Z"}"#,
            r#"{"token":""}"#,
        ] {
            let host = StubHost::start(vec![route("POST", TOKENS, 201, body)]).await;
            let err = broker(host.url()).authenticate("inst1").await.unwrap_err();
            assert!(err.message().contains("empty or already expired"));
        }
    }

    #[tokio::test]
    async fn broker_names_the_rejection_reason() {
        let host = StubHost::start(Vec::new()).await;
        let err = broker(host.url()).authenticate("inst1").await.unwrap_err();
        assert!(matches!(err, PipelineError::AuthenticationFailed(_)));
        assert!(err.message().contains("installation not found (404)"));
        assert!(!err.message().contains("app_secret"));
    }

    #[tokio::test]
    async fn unreachable_broker_fails_authentication() {
        let mut config = TokenBrokerConfig::new("http://127.0.0.1:1", "t");
        config.timeout_secs = 2;
        let broker = HttpTokenBroker::new(config).unwrap();
        let err = broker.authenticate("inst1").await.unwrap_err();
        assert!(matches!(err, PipelineError::AuthenticationFailed(_)));
    }
}
