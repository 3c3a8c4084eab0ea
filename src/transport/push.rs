use anyhow::{Context, Result};
use async_nats::Client;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{ChatMessage, ChatResponse, ErrorMessage, VoiceResponse};
use super::TransportState;
use crate::error::ChatError;

/// Wildcard subjects for inbound events. The backend fans replies out per
/// session under these prefixes; filtering by the payload session id is the
/// receiver's job.
pub const SUBJECT_CHAT_RESPONSES: &str = "chat.response.>";
pub const SUBJECT_VOICE_RESPONSES: &str = "chat.voice.>";
pub const SUBJECT_ERRORS: &str = "chat.error.>";

/// Subject the backend consumes chat messages from, one per session.
pub fn chat_subject(session_id: &str) -> String {
    format!("chat.message.{}", session_id)
}

/// Events surfaced by the push channel: connection lifecycle transitions
/// and decoded inbound payloads.
#[derive(Debug, Clone)]
pub enum PushEvent {
    Lifecycle(TransportState),
    Chat(ChatResponse),
    Voice(VoiceResponse),
    Error(ErrorMessage),
}

/// NATS-backed push channel.
///
/// Connecting subscribes to all inbound event subjects and starts a pump
/// task that decodes payloads into [`PushEvent`]s. Reconnects are handled
/// by the client; lifecycle transitions are only observed and forwarded.
pub struct PushChannel {
    client: Client,
}

impl PushChannel {
    /// Connect to the push channel and start the event pump.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<PushEvent>)> {
        info!("Connecting to push channel at {}", url);

        let (tx, rx) = mpsc::channel(256);

        let lifecycle_tx = tx.clone();
        let client = async_nats::ConnectOptions::new()
            .event_callback(move |event| {
                let tx = lifecycle_tx.clone();
                async move {
                    debug!("Push channel event: {:?}", event);
                    if let Some(state) = lifecycle_state(&event) {
                        let _ = tx.send(PushEvent::Lifecycle(state)).await;
                    }
                }
            })
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to push channel");

        let chat_sub = client
            .subscribe(SUBJECT_CHAT_RESPONSES)
            .await
            .context("Failed to subscribe to chat responses")?;
        let voice_sub = client
            .subscribe(SUBJECT_VOICE_RESPONSES)
            .await
            .context("Failed to subscribe to voice responses")?;
        let error_sub = client
            .subscribe(SUBJECT_ERRORS)
            .await
            .context("Failed to subscribe to error events")?;

        let mut inbound = futures::stream::select_all(vec![
            chat_sub.map(|msg| decode_chat(&msg)).boxed(),
            voice_sub.map(|msg| decode_voice(&msg)).boxed(),
            error_sub.map(|msg| decode_error(&msg)).boxed(),
        ]);

        // The connect call only returns once the connection is up; the
        // callback reports transitions from here on.
        let _ = tx.send(PushEvent::Lifecycle(TransportState::Connected)).await;

        tokio::spawn(async move {
            while let Some(event) = inbound.next().await {
                let Some(event) = event else { continue };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            debug!("Push event pump ended");
        });

        Ok((Self { client }, rx))
    }

    /// Publish a chat message to the backend.
    pub async fn publish_chat(&self, message: &ChatMessage) -> Result<(), ChatError> {
        let subject = chat_subject(&message.session_id);
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| ChatError::network(format!("Publish to {} failed: {}", subject, e)))?;

        debug!(
            "Published chat message to {} (correlation={})",
            subject, message.correlation_id
        );

        Ok(())
    }
}

fn lifecycle_state(event: &async_nats::Event) -> Option<TransportState> {
    match event {
        async_nats::Event::Connected => Some(TransportState::Connected),
        async_nats::Event::Disconnected => Some(TransportState::Disconnected),
        async_nats::Event::ClientError(_) => Some(TransportState::Failed),
        _ => None,
    }
}

fn decode_chat(msg: &async_nats::Message) -> Option<PushEvent> {
    match serde_json::from_slice::<ChatResponse>(&msg.payload) {
        Ok(response) => Some(PushEvent::Chat(response)),
        Err(e) => {
            warn!("Failed to parse chat response: {}", e);
            None
        }
    }
}

fn decode_voice(msg: &async_nats::Message) -> Option<PushEvent> {
    match serde_json::from_slice::<VoiceResponse>(&msg.payload) {
        Ok(response) => Some(PushEvent::Voice(response)),
        Err(e) => {
            warn!("Failed to parse voice response: {}", e);
            None
        }
    }
}

fn decode_error(msg: &async_nats::Message) -> Option<PushEvent> {
    match serde_json::from_slice::<ErrorMessage>(&msg.payload) {
        Ok(event) => Some(PushEvent::Error(event)),
        Err(e) => {
            warn!("Failed to parse error event: {}", e);
            None
        }
    }
}
