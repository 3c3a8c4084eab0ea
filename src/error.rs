//! Client-side failure taxonomy.
//!
//! Every variant is recoverable at the point it occurs: the controller turns
//! errors into user notices and settles its state machines, it never
//! propagates them to the caller.

use thiserror::Error;

/// Failures the chat client handles locally.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Microphone access was denied, or the capture device failed to open.
    #[error("Microphone unavailable: {0}")]
    PermissionDenied(String),

    /// Transport-level failure on the push channel or the HTTP fallback.
    #[error("Network failure: {0}")]
    Network(String),

    /// The backend answered with a structured error payload.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Local history or payload data could not be encoded or decoded.
    #[error("Serialization failure: {0}")]
    Serialization(String),
}

impl ChatError {
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
