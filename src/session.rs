//! Run-scoped session state
//!
//! One [`SessionContext`] exists per run. The sequencer owns it; steps only
//! see it by reference and change it through [`ContextUpdate`]s.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::common::config::TargetConfig;
use crate::common::{join_url, Error, Result};
use crate::http::{HttpRequest, Transport};

/// State carried from step to step during one run
#[derive(Debug, Clone)]
pub struct SessionContext {
    session_token: String,
    secondary_token: Option<String>,
    resource_ids: BTreeMap<String, String>,
    last_payload: Option<Value>,
}

/// A partial update produced by a step's extraction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextUpdate {
    pub secondary_token: Option<String>,
    pub resource_ids: Vec<(String, String)>,
    pub last_payload: Option<Value>,
}

impl ContextUpdate {
    pub fn resource_id(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_ids: vec![(name.into(), id.into())],
            ..Default::default()
        }
    }

    pub fn secondary_token(token: impl Into<String>) -> Self {
        Self {
            secondary_token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn payload(value: Value) -> Self {
        Self {
            last_payload: Some(value),
            ..Default::default()
        }
    }

    /// Fold another update into this one; later values win
    pub fn merge(&mut self, other: ContextUpdate) {
        if other.secondary_token.is_some() {
            self.secondary_token = other.secondary_token;
        }
        self.resource_ids.extend(other.resource_ids);
        if other.last_payload.is_some() {
            self.last_payload = other.last_payload;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.secondary_token.is_none() && self.resource_ids.is_empty() && self.last_payload.is_none()
    }
}

impl SessionContext {
    /// Create a context around an already issued session token
    pub fn new(session_token: impl Into<String>) -> Result<Self> {
        let session_token = session_token.into();
        if session_token.trim().is_empty() {
            return Err(Error::Config("Session token must not be empty".to_string()));
        }
        Ok(Self {
            session_token,
            secondary_token: None,
            resource_ids: BTreeMap::new(),
            last_payload: None,
        })
    }

    /// Obtain a fresh session from the remote system's bootstrap endpoint
    #[tracing::instrument(skip_all, fields(base_url = %target.base_url))]
    pub async fn bootstrap(transport: &dyn Transport, target: &TargetConfig) -> Result<Self> {
        let url = join_url(&target.base_url, &target.bootstrap_path);
        let response = transport.send(HttpRequest::new("POST", url.clone())).await?;

        if !response.is_success() {
            return Err(Error::Transport(format!(
                "Session bootstrap at {} returned status {}",
                url, response.status
            )));
        }

        let token = response.header(&target.session_header).ok_or_else(|| {
            Error::MalformedResponse(format!(
                "Session bootstrap response has no '{}' header",
                target.session_header
            ))
        })?;

        tracing::info!("Session initialized");
        tracing::debug!(token, "session token issued");
        Self::new(token)
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn secondary_token(&self) -> Option<&str> {
        self.secondary_token.as_deref()
    }

    pub fn resource_id(&self, name: &str) -> Option<&str> {
        self.resource_ids.get(name).map(String::as_str)
    }

    pub fn resource_ids(&self) -> &BTreeMap<String, String> {
        &self.resource_ids
    }

    pub fn last_payload(&self) -> Option<&Value> {
        self.last_payload.as_ref()
    }

    /// Apply a partial update; the session token itself is never replaced
    pub fn apply(&mut self, update: ContextUpdate) {
        if let Some(token) = update.secondary_token {
            self.secondary_token = Some(token);
        }
        for (name, id) in update.resource_ids {
            tracing::debug!(name = %name, id = %id, "captured resource id");
            self.resource_ids.insert(name, id);
        }
        if let Some(payload) = update.last_payload {
            self.last_payload = Some(payload);
        }
    }
}
