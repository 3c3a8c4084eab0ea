use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use reqwest::multipart;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::messages::{
    ChatMessage, ChatResponse, ErrorMessage, HealthResponse, SynthesizeRequest,
    SynthesizeResponse, VoiceResponse,
};
use crate::capture::VoiceClip;
use crate::error::ChatError;

/// Client for the backend REST API: fallback chat plus the voice endpoints.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    /// `POST /api/chat` request/response fallback.
    pub async fn chat(&self, message: &ChatMessage) -> Result<ChatResponse, ChatError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!("POST {} (correlation={})", url, message.correlation_id);

        let response = self.client.post(&url).json(message).send().await?;
        read_response(response).await
    }

    /// `POST /api/voice/transcribe` with the clip as a multipart WAV part.
    pub async fn transcribe(
        &self,
        clip: &VoiceClip,
        session_id: &str,
        correlation_id: u64,
    ) -> Result<VoiceResponse, ChatError> {
        let url = format!("{}/api/voice/transcribe", self.base_url);
        debug!(
            "POST {} ({}ms clip, correlation={})",
            url, clip.duration_ms, correlation_id
        );

        let audio = multipart::Part::bytes(clip.wav.clone())
            .file_name("capture.wav")
            .mime_str("audio/wav")
            .map_err(|e| ChatError::serialization(format!("Audio part: {}", e)))?;
        let form = multipart::Form::new()
            .part("audio", audio)
            .text("session_id", session_id.to_string())
            .text("correlation_id", correlation_id.to_string());

        let response = self.client.post(&url).multipart(form).send().await?;
        read_response(response).await
    }

    /// `POST /api/voice/synthesize`, decoding the base64 audio payload.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ChatError> {
        let url = format!("{}/api/voice/synthesize", self.base_url);

        let request = SynthesizeRequest {
            text: text.to_string(),
        };
        let response = self.client.post(&url).json(&request).send().await?;
        let synthesized: SynthesizeResponse = read_response(response).await?;

        base64::engine::general_purpose::STANDARD
            .decode(&synthesized.audio_data)
            .map_err(|e| ChatError::backend(format!("Malformed audio payload: {}", e)))
    }

    /// `GET /api/health` liveness probe.
    pub async fn health(&self) -> Result<HealthResponse, ChatError> {
        let url = format!("{}/api/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        read_response(response).await
    }
}

/// Decode a backend response body. The backend reports some failures with
/// a success status and an `{error}` body, so the expected shape is tried
/// first and the structured error second.
async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ChatError> {
    let status = response.status();
    let body = response.bytes().await?;

    if status.is_success() {
        if let Ok(parsed) = serde_json::from_slice::<T>(&body) {
            return Ok(parsed);
        }
        if let Ok(err) = serde_json::from_slice::<ErrorMessage>(&body) {
            return Err(ChatError::backend(err.error));
        }
        return Err(ChatError::backend(format!(
            "Malformed response body ({} bytes)",
            body.len()
        )));
    }

    if let Ok(err) = serde_json::from_slice::<ErrorMessage>(&body) {
        return Err(ChatError::backend(err.error));
    }

    Err(ChatError::backend(format!("HTTP {}", status)))
}
