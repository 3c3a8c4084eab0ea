use serde::{Deserialize, Serialize};

/// Outgoing chat message. The push channel publishes it as an event
/// payload; the HTTP fallback posts it as the request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
    pub session_id: String,
    /// Per-session monotonic sequence, echoed back by well-behaved backends.
    pub correlation_id: u64,
}

/// Assistant reply to a typed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub timestamp: Option<String>, // RFC3339
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<u64>,
}

/// Transcription plus assistant reply for a submitted voice clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceResponse {
    pub transcribed_text: String,
    pub response: String,
    #[serde(default)]
    pub timestamp: Option<String>, // RFC3339
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<u64>,
}

/// Structured error payload emitted by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<u64>,
}

/// Request body for speech synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
}

/// Synthesized speech for an assistant reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizeResponse {
    pub audio_data: String, // Base64-encoded audio bytes
}

/// Backend liveness report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Per-service availability as reported by the backend.
    #[serde(default)]
    pub services: std::collections::BTreeMap<String, bool>,
}
