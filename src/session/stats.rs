use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::capture::CaptureState;
use crate::transport::TransportState;

/// Point-in-time view of a session for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Active session identifier
    pub session_id: String,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Seconds since the session started
    pub duration_secs: f64,

    /// Push channel health as last observed
    pub transport: TransportState,

    /// Voice capture state
    pub capture: CaptureState,

    /// Messages currently rendered in the view
    pub visible_messages: usize,

    /// Messages in durable storage
    pub stored_messages: usize,

    /// Turns still awaiting their reply
    pub turns_in_flight: usize,

    /// Notices currently shown
    pub active_notices: usize,
}
