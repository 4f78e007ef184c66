//! Secondary credential exchange
//!
//! Trades the run's session token plus a fixed basic-auth pair for a
//! narrower bearer token read from a response header. The exchange never
//! touches the [`SessionContext`](crate::session::SessionContext); callers
//! store the result.

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

use crate::common::config::{CredentialConfig, TargetConfig};
use crate::common::{join_url, Error, Result};
use crate::http::{HttpRequest, Transport};

/// A username/password pair sent as `Authorization: Basic ...`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Full `Authorization` header value
    pub fn header_value(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", general_purpose::STANDARD.encode(raw))
    }
}

/// When a step needing the secondary token triggers a new exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryTokenStrategy {
    /// Exchange before every step that references the token
    #[default]
    AlwaysExchange,
    /// Exchange once and reuse the stored token for the rest of the run
    CacheAndReuse,
}

impl SecondaryTokenStrategy {
    /// Whether a new exchange is needed given the currently stored token
    pub fn needs_exchange(self, current: Option<&str>) -> bool {
        match self {
            Self::AlwaysExchange => true,
            Self::CacheAndReuse => current.is_none(),
        }
    }
}

/// Result of one successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryToken(pub String);

impl SecondaryToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Derives secondary tokens from a session token
#[derive(Debug, Clone)]
pub struct CredentialExchange {
    url: String,
    session_header: String,
    token_header: String,
    credentials: BasicCredentials,
}

impl CredentialExchange {
    pub fn new(target: &TargetConfig, config: &CredentialConfig) -> Self {
        Self {
            url: join_url(&target.base_url, &config.token_path),
            session_header: target.session_header.clone(),
            token_header: config.token_header.clone(),
            credentials: config.basic(),
        }
    }

    /// Same endpoint, different basic credentials
    pub fn with_credentials(&self, credentials: BasicCredentials) -> Self {
        Self {
            credentials,
            ..self.clone()
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run one exchange. Safe to call any number of times per run.
    #[tracing::instrument(skip_all, fields(endpoint = %self.url))]
    pub async fn exchange(
        &self,
        transport: &dyn Transport,
        session_token: &str,
    ) -> Result<SecondaryToken> {
        let request = HttpRequest::new("POST", self.url.clone())
            .with_header(self.session_header.clone(), session_token)
            .with_header("Accept", "application/json")
            .with_header("Authorization", self.credentials.header_value());

        let response = transport.send(request).await?;

        if !response.is_success() {
            tracing::warn!(status = response.status, "credential exchange rejected");
            return Err(Error::CredentialExchange {
                status: response.status,
                endpoint: self.url.clone(),
            });
        }

        let token = response
            .header(&self.token_header)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::MalformedResponse(format!(
                    "Credential exchange response has no '{}' header",
                    self.token_header
                ))
            })?;

        tracing::debug!(token, "secondary token issued");
        Ok(SecondaryToken(token.to_string()))
    }
}
