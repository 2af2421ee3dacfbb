//! Error types for credential resolution and the deliver step.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StepError>;

#[derive(Debug, Error)]
pub enum StepError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network request failed with status {status}, body ({body})")]
    Network { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    HttpRequest(String),

    #[error("Invalid developer connection response: {0}")]
    InvalidResponse(String),

    #[error("Could not fetch private key ({path}) specified as input: {reason}")]
    KeyFetch { path: String, reason: String },

    #[error("Apple Service authentication not configured")]
    MissingAuthConfig,

    #[error("Invalid session data: {0}")]
    SessionData(String),

    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StepError {
    pub(crate) fn key_fetch(path: &str, reason: impl std::fmt::Display) -> Self {
        Self::KeyFetch {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for the 404 answer the build service gives when no developer
    /// account is connected to the build.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Network { status: 404, .. })
    }
}
