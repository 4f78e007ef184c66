//! API Challenger - a stateful conformance harness for HTTP APIs
//!
//! Drives ordered scenarios against a remote API that tracks each caller
//! through a session token, exchanges credentials for a secondary token when
//! a step needs one, and checks every response against declared expectations.

pub mod commands;
pub mod common;
pub mod credential;
pub mod http;
pub mod negotiation;
pub mod scenario;
pub mod session;
pub mod validator;

// Re-export commonly used types for tests
pub use common::{Config, Error, Result};
pub use scenario::{RunReport, Scenario, Sequencer};
