use std::time::Duration;

use crate::capture::CaptureConfig;

/// Tunables for one chat session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How many stored messages are replayed into the view on startup.
    /// The stored sequence itself is never truncated by this cap.
    pub restore_limit: usize,

    /// Optional cap on stored history length. Oldest messages are trimmed
    /// at persist time; `None` keeps everything.
    pub max_stored: Option<usize>,

    /// How long a notice stays visible before it expires
    pub notice_ttl: Duration,

    /// Capture format requested from the input device
    pub capture: CaptureConfig,

    /// Whether assistant replies are sent to the playback sink
    pub speak_replies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            restore_limit: 5,
            max_stored: None,
            notice_ttl: Duration::from_secs(10),
            capture: CaptureConfig::default(),
            speak_replies: true,
        }
    }
}

/// Fresh opaque session identifier.
pub fn new_session_id() -> String {
    format!("session-{}", uuid::Uuid::new_v4())
}
