//! Error types for the conformance harness
//!
//! Assertion mismatches are not errors: the validator returns them as
//! values. The variants here cover everything that stops a step (or a
//! whole run) from producing a verdict.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Transport Errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    // === Request Errors ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Credential Errors ===
    #[error("Credential exchange at '{endpoint}' failed with status {status}")]
    CredentialExchange { status: u16, endpoint: String },

    // === Response Errors ===
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Failed to parse {format} body: {message}")]
    BodyParse { format: String, message: String },

    // === Sequencing Errors ===
    #[error("Step '{step}' cannot run: {requirement}")]
    UnmetDependency { step: String, requirement: String },

    #[error("Invalid template expression: {0}")]
    Template(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an unmet dependency error
    pub fn unmet_dependency(step: &str, requirement: impl Into<String>) -> Self {
        Self::UnmetDependency {
            step: step.to_string(),
            requirement: requirement.into(),
        }
    }

    /// Create a body parse error
    pub fn body_parse(format: &str, message: impl Into<String>) -> Self {
        Self::BodyParse {
            format: format.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error ends the whole run rather than just the current step
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
