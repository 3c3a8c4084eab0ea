//! Transports between the client and the chat backend.
//!
//! Two paths exist: the NATS push channel (preferred while connected) and
//! the HTTP fallback. Voice endpoints (transcribe, synthesize, health) are
//! HTTP only. The `ChatBackend` trait is the seam the session layer talks
//! through; tests substitute scripted implementations.

pub mod http;
pub mod messages;
pub mod push;

pub use http::HttpApi;
pub use messages::{
    ChatMessage, ChatResponse, ErrorMessage, HealthResponse, SynthesizeRequest,
    SynthesizeResponse, VoiceResponse,
};
pub use push::{PushChannel, PushEvent};

use serde::Serialize;

use crate::capture::VoiceClip;
use crate::error::ChatError;

/// Connection health of the push channel as last observed.
///
/// The client only observes lifecycle events, it never manages the
/// connection; async-nats reconnects on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Connected,
    Disconnected,
    Failed,
}

/// The chat backend as the client sees it.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Fire a chat message over the push channel. The reply arrives later
    /// as a push event, not as a return value.
    async fn push_chat(&self, message: &ChatMessage) -> Result<(), ChatError>;

    /// Request/response chat over the HTTP fallback.
    async fn http_chat(&self, message: &ChatMessage) -> Result<ChatResponse, ChatError>;

    /// Submit a finished voice clip for transcription and reply.
    async fn transcribe(
        &self,
        clip: &VoiceClip,
        session_id: &str,
        correlation_id: u64,
    ) -> Result<VoiceResponse, ChatError>;

    /// Synthesize reply text into audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ChatError>;

    /// Probe backend liveness.
    async fn health(&self) -> Result<HealthResponse, ChatError>;
}

/// Production backend: HTTP API plus an optional push channel.
pub struct BackendClient {
    http: HttpApi,
    push: Option<PushChannel>,
}

impl BackendClient {
    pub fn new(http: HttpApi) -> Self {
        Self { http, push: None }
    }

    pub fn with_push(mut self, push: PushChannel) -> Self {
        self.push = Some(push);
        self
    }
}

#[async_trait::async_trait]
impl ChatBackend for BackendClient {
    async fn push_chat(&self, message: &ChatMessage) -> Result<(), ChatError> {
        match &self.push {
            Some(push) => push.publish_chat(message).await,
            None => Err(ChatError::network("Push channel is not configured")),
        }
    }

    async fn http_chat(&self, message: &ChatMessage) -> Result<ChatResponse, ChatError> {
        self.http.chat(message).await
    }

    async fn transcribe(
        &self,
        clip: &VoiceClip,
        session_id: &str,
        correlation_id: u64,
    ) -> Result<VoiceResponse, ChatError> {
        self.http.transcribe(clip, session_id, correlation_id).await
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ChatError> {
        self.http.synthesize(text).await
    }

    async fn health(&self) -> Result<HealthResponse, ChatError> {
        self.http.health().await
    }
}
