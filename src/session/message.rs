//! Conversation log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// How the exchange entered the session.
///
/// Assistant replies inherit the source of the turn they answer, so a
/// spoken question and its answer are both marked `Voice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    Typed,
    Voice,
}

/// A single entry in the session's conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author of this entry.
    pub role: Role,
    /// Rendered text content.
    pub content: String,
    /// When the entry was created (client clock for user input, backend
    /// timestamp for replies when provided).
    pub timestamp: DateTime<Utc>,
    /// Input modality of the turn this entry belongs to.
    pub source: MessageSource,
}

impl Message {
    pub fn user(content: impl Into<String>, source: MessageSource) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            source,
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        source: MessageSource,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp,
            source,
        }
    }
}
