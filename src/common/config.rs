//! Configuration file handling

use serde::Deserialize;
use std::path::Path;

use super::paths::config_path;
use super::{Error, Result};
use crate::credential::{BasicCredentials, SecondaryTokenStrategy};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Remote system under test
    #[serde(default)]
    pub target: TargetConfig,

    /// Secondary credential endpoint settings
    #[serde(default)]
    pub credentials: CredentialConfig,

    /// Per-run session behaviour
    #[serde(default)]
    pub session: SessionConfig,
}

/// Remote system under test
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Base URL all step paths are resolved against
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Header carrying the session token on every request
    #[serde(default = "default_session_header")]
    pub session_header: String,

    /// Path that issues a fresh session token
    #[serde(default = "default_bootstrap_path")]
    pub bootstrap_path: String,

    /// Transport timeout; absent means requests may block indefinitely
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_header: default_session_header(),
            bootstrap_path: default_bootstrap_path(),
            timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    "https://apichallenges.herokuapp.com/".to_string()
}
fn default_session_header() -> String {
    "x-challenger".to_string()
}
fn default_bootstrap_path() -> String {
    "challenger".to_string()
}

/// Secondary credential endpoint settings
#[derive(Debug, Deserialize, Clone)]
pub struct CredentialConfig {
    /// Path of the basic-auth gated token endpoint
    #[serde(default = "default_token_path")]
    pub token_path: String,

    /// Response header holding the issued secondary token
    #[serde(default = "default_token_header")]
    pub token_header: String,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            token_path: default_token_path(),
            token_header: default_token_header(),
            username: default_username(),
            password: default_password(),
        }
    }
}

impl CredentialConfig {
    /// The configured basic credential pair
    pub fn basic(&self) -> BasicCredentials {
        BasicCredentials::new(&self.username, &self.password)
    }
}

fn default_token_path() -> String {
    "secret/token".to_string()
}
fn default_token_header() -> String {
    "x-auth-token".to_string()
}
fn default_username() -> String {
    "admin".to_string()
}
fn default_password() -> String {
    "password".to_string()
}

/// Per-run session behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// When to derive a new secondary token
    #[serde(default)]
    pub secondary_token: SecondaryTokenStrategy,

    /// Require every response to echo the session header back
    #[serde(default = "default_echo")]
    pub echo_session_header: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secondary_token: SecondaryTokenStrategy::default(),
            echo_session_header: default_echo(),
        }
    }
}

fn default_echo() -> bool {
    true
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
    }
}
