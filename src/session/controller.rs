use std::mem;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::{new_session_id, SessionConfig};
use super::message::{Message, MessageSource};
use super::stats::SessionStats;
use super::turn::{Correlation, TurnLedger};
use crate::capture::{CaptureBuffer, CaptureDevice, CaptureState};
use crate::error::ChatError;
use crate::history::{HistoryStore, StoredHistory};
use crate::notify::{Notice, NoticeBoard, NoticeKind};
use crate::playback::SpeechPlayback;
use crate::transport::{
    ChatBackend, ChatMessage, ChatResponse, PushEvent, TransportState, VoiceResponse,
};

/// Internal event queue payload.
///
/// Helper tasks and the push channel post these; `handle_event` consumes
/// them on the owner task, so all session state mutates in one place.
#[derive(Debug)]
pub enum SessionEvent {
    /// Inbound push-channel traffic: lifecycle transitions and replies.
    Push(PushEvent),

    /// Outcome of a fallback chat dispatch.
    ChatResult {
        correlation: Correlation,
        result: Result<ChatResponse, ChatError>,
    },

    /// Outcome of a voice clip submission.
    VoiceResult {
        correlation: Correlation,
        result: Result<VoiceResponse, ChatError>,
    },

    /// Failure from a detached task (synthesis, playback).
    Fault(ChatError),
}

impl From<PushEvent> for SessionEvent {
    fn from(event: PushEvent) -> Self {
        Self::Push(event)
    }
}

/// Observer feed for a UI binding.
///
/// Messages arrive here in completion order; the canonical user-action
/// ordering is what [`SessionController::messages`] returns.
#[derive(Debug, Clone)]
pub enum SessionOutput {
    Message(Message),
    Notice(Notice),
    Transport(TransportState),
    Capture(CaptureState),
    SessionReset { session_id: String },
}

/// Owns one chat session: the conversation log, transport mode selection,
/// the voice-capture lifecycle, history persistence, and user notices.
///
/// Explicitly constructed and torn down; nothing here is global.
pub struct SessionController {
    /// Session tunables
    config: SessionConfig,

    /// Opaque identifier, rotated on reset
    session_id: String,

    /// Next correlation sequence number for this session
    next_seq: u64,

    /// Tail of stored history replayed into the view at startup
    restored: Vec<Message>,

    /// Full stored message sequence loaded at startup
    stored: Vec<Message>,

    /// This session's turns, one per user action
    turns: TurnLedger,

    /// Push channel health as last observed
    transport: TransportState,

    /// Voice capture state machine
    capture: CaptureState,

    /// Microphone seam
    device: Box<dyn CaptureDevice>,

    /// Frame accumulator for the capture in progress
    capture_buffer: Option<Arc<Mutex<CaptureBuffer>>>,

    /// Frame pump for the capture in progress
    capture_pump: Option<JoinHandle<()>>,

    /// Correlation of the voice submission that owns the processing state
    processing: Option<Correlation>,

    /// Backend seam shared with dispatch tasks
    backend: Arc<dyn ChatBackend>,

    /// Durable history storage
    store: Box<dyn HistoryStore>,

    /// Optional reply playback sink
    playback: Option<Arc<dyn SpeechPlayback>>,

    /// Active user notices
    notices: NoticeBoard,

    /// Sender cloned into helper tasks
    events_tx: mpsc::Sender<SessionEvent>,

    /// Receiver side of the event queue, handed to the driving loop
    events_rx: Option<mpsc::Receiver<SessionEvent>>,

    /// Optional observer channel
    outputs: Option<mpsc::UnboundedSender<SessionOutput>>,

    /// When this session started
    started_at: DateTime<Utc>,
}

impl SessionController {
    /// Create a controller and restore stored history into the view.
    ///
    /// At most `restore_limit` stored messages become visible; the stored
    /// sequence itself stays intact. A storage failure degrades to an
    /// empty view with a notice.
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn ChatBackend>,
        device: Box<dyn CaptureDevice>,
        store: Box<dyn HistoryStore>,
    ) -> Self {
        let session_id = new_session_id();
        info!("Creating chat session: {}", session_id);

        let (events_tx, events_rx) = mpsc::channel(256);
        let mut notices = NoticeBoard::new(config.notice_ttl);

        let (stored, restored) = match store.load() {
            Ok(history) => {
                let stored = history.messages;
                let skip = stored.len().saturating_sub(config.restore_limit);
                let restored = stored[skip..].to_vec();
                if !restored.is_empty() {
                    info!(
                        "Restored {} of {} stored messages into view",
                        restored.len(),
                        stored.len()
                    );
                }
                (stored, restored)
            }
            Err(e) => {
                warn!("Failed to restore history: {}", e);
                notices.post_error(&e);
                (Vec::new(), Vec::new())
            }
        };

        Self {
            config,
            session_id,
            next_seq: 0,
            restored,
            stored,
            turns: TurnLedger::new(),
            transport: TransportState::Disconnected,
            capture: CaptureState::Idle,
            device,
            capture_buffer: None,
            capture_pump: None,
            processing: None,
            backend,
            store,
            playback: None,
            notices,
            events_tx,
            events_rx: Some(events_rx),
            outputs: None,
            started_at: Utc::now(),
        }
    }

    /// Attach a playback sink for synthesized replies.
    pub fn with_playback(mut self, sink: Arc<dyn SpeechPlayback>) -> Self {
        self.playback = Some(sink);
        self
    }

    // ===== Wiring =====

    /// Sender for posting events into the session queue. The push channel
    /// pump and tests use this.
    pub fn events_sender(&self) -> mpsc::Sender<SessionEvent> {
        self.events_tx.clone()
    }

    /// Hand the queue receiver to the driving loop. The controller keeps
    /// the sender for its helper tasks.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.events_rx.take()
    }

    /// Subscribe to rendered output. One observer at a time.
    pub fn watch_outputs(&mut self) -> mpsc::UnboundedReceiver<SessionOutput> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outputs = Some(tx);
        rx
    }

    /// Process everything currently queued without blocking. Drivers that
    /// keep the receiver inside the controller (tests, embedders) call
    /// this after operations that spawn work.
    pub async fn drain_events(&mut self) {
        let mut rx = match self.events_rx.take() {
            Some(rx) => rx,
            None => return,
        };
        while let Ok(event) = rx.try_recv() {
            self.handle_event(event).await;
        }
        self.events_rx = Some(rx);
    }

    // ===== Read access =====

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture
    }

    /// The rendered view: restored tail plus this session's turns in
    /// user-action order.
    pub fn messages(&self) -> Vec<Message> {
        self.restored
            .iter()
            .cloned()
            .chain(self.turns.view().cloned())
            .collect()
    }

    /// Everything durable storage would contain right now.
    pub fn full_history(&self) -> StoredHistory {
        StoredHistory::new(
            self.stored
                .iter()
                .cloned()
                .chain(self.turns.confirmed().cloned())
                .collect(),
        )
    }

    /// Active notices, expired ones swept.
    pub fn notices(&mut self) -> Vec<Notice> {
        self.notices.active()
    }

    pub fn dismiss_notices(&mut self) {
        self.notices.dismiss_all();
    }

    pub fn stats(&mut self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);
        SessionStats {
            session_id: self.session_id.clone(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            transport: self.transport,
            capture: self.capture,
            visible_messages: self.messages().len(),
            stored_messages: self.stored.len() + self.turns.confirmed().count(),
            turns_in_flight: self.turns.in_flight(),
            active_notices: self.notices.active().len(),
        }
    }

    // ===== Operations =====

    /// Send a typed message. Empty or whitespace-only input is a silent
    /// no-op with no network activity. Returns the turn's sequence number
    /// when a dispatch happened.
    pub async fn send_typed_message(&mut self, text: &str) -> Option<u64> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring empty message");
            return None;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        // The user's message renders before any network activity resolves.
        let message = Message::user(text, MessageSource::Typed);
        self.turns.open_typed(seq, message.clone());
        self.emit(SessionOutput::Message(message));

        let wire = ChatMessage {
            message: text.to_string(),
            session_id: self.session_id.clone(),
            correlation_id: seq,
        };

        // Exactly one dispatch: push while connected, otherwise fallback.
        match self.transport {
            TransportState::Connected => {
                debug!("Dispatching turn {} over push channel", seq);
                if let Err(e) = self.backend.push_chat(&wire).await {
                    warn!("Push dispatch failed: {}", e);
                    self.fail_turn(seq, &e);
                }
            }
            _ => {
                debug!("Dispatching turn {} over HTTP fallback", seq);
                let backend = Arc::clone(&self.backend);
                let events = self.events_tx.clone();
                let correlation = Correlation::new(self.session_id.clone(), seq);
                tokio::spawn(async move {
                    let result = backend.http_chat(&wire).await;
                    let _ = events
                        .send(SessionEvent::ChatResult {
                            correlation,
                            result,
                        })
                        .await;
                });
            }
        }

        Some(seq)
    }

    /// Begin a voice capture.
    ///
    /// Only the idle state acquires the device. While recording, a repeat
    /// call stops the capture (toggle semantics); while processing it is
    /// rejected without side effect.
    pub async fn start_capture(&mut self) {
        match self.capture {
            CaptureState::Recording => {
                self.stop_capture().await;
            }
            CaptureState::Processing => {
                debug!("Capture busy processing; start rejected");
            }
            CaptureState::Idle => {
                info!("Starting voice capture ({})", self.device.name());
                match self.device.start().await {
                    Ok(mut frames) => {
                        let buffer =
                            Arc::new(Mutex::new(CaptureBuffer::new(&self.config.capture)));
                        let sink = Arc::clone(&buffer);
                        let pump = tokio::spawn(async move {
                            while let Some(frame) = frames.recv().await {
                                sink.lock().await.push(&frame);
                            }
                        });

                        self.capture_buffer = Some(buffer);
                        self.capture_pump = Some(pump);
                        self.set_capture(CaptureState::Recording);
                    }
                    Err(e) => {
                        let err = ChatError::permission_denied(e.to_string());
                        warn!("{}", err);
                        self.notify(Notice::from_error(&err));
                    }
                }
            }
        }
    }

    /// End the active capture and submit the clip for transcription.
    ///
    /// The device is released unconditionally; failures afterwards surface
    /// as notices and settle the state machine back to idle.
    pub async fn stop_capture(&mut self) {
        if self.capture != CaptureState::Recording {
            debug!("No active capture to stop");
            return;
        }

        info!("Stopping voice capture");
        self.set_capture(CaptureState::Processing);

        if let Err(e) = self.device.stop().await {
            warn!("Capture device stop failed: {}", e);
        }

        // The device closed the frame channel; let the pump drain it
        // before the buffer is read.
        if let Some(pump) = self.capture_pump.take() {
            let _ = pump.await;
        }

        let buffer = match self.capture_buffer.take() {
            Some(buffer) => match Arc::try_unwrap(buffer) {
                Ok(mutex) => mutex.into_inner(),
                Err(_) => {
                    error!("Capture buffer still shared after pump exit");
                    self.set_capture(CaptureState::Idle);
                    return;
                }
            },
            None => {
                self.set_capture(CaptureState::Idle);
                return;
            }
        };

        if buffer.is_empty() {
            info!("Capture produced no audio");
            self.notify(Notice::new(NoticeKind::Info, "Nothing was recorded."));
            self.set_capture(CaptureState::Idle);
            return;
        }

        let clip = match buffer.finalize() {
            Ok(clip) => clip,
            Err(e) => {
                warn!("{}", e);
                self.notify(Notice::from_error(&e));
                self.set_capture(CaptureState::Idle);
                return;
            }
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.turns.open_voice(seq);

        let correlation = Correlation::new(self.session_id.clone(), seq);
        self.processing = Some(correlation.clone());

        info!(
            "Submitting voice clip: {}ms, {} bytes (correlation={})",
            clip.duration_ms,
            clip.wav.len(),
            seq
        );

        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = backend
                .transcribe(&clip, &correlation.session_id, correlation.seq)
                .await;
            let _ = events
                .send(SessionEvent::VoiceResult {
                    correlation,
                    result,
                })
                .await;
        });
    }

    /// UI toggle: idle starts, recording stops, processing ignores.
    pub async fn toggle_capture(&mut self) {
        match self.capture {
            CaptureState::Idle => self.start_capture().await,
            CaptureState::Recording => self.stop_capture().await,
            CaptureState::Processing => {
                debug!("Capture busy processing; toggle ignored");
            }
        }
    }

    /// Destructive reset: empties the view and durable storage, rotates
    /// the session id. Confirmation is the UI's job. In-flight work is
    /// untouched; its replies carry the old session id and are discarded
    /// on arrival. Returns the new id.
    pub fn reset_session(&mut self) -> String {
        let old = mem::replace(&mut self.session_id, new_session_id());
        info!("Session reset: {} -> {}", old, self.session_id);

        self.turns.clear();
        self.stored.clear();
        self.restored.clear();
        self.next_seq = 0;
        self.started_at = Utc::now();

        if let Err(e) = self.store.save(&StoredHistory::default()) {
            warn!("Failed to clear stored history: {}", e);
            self.notify(Notice::from_error(&e));
        }

        self.emit(SessionOutput::SessionReset {
            session_id: self.session_id.clone(),
        });
        self.session_id.clone()
    }

    /// Release held resources before dropping the controller.
    pub async fn shutdown(&mut self) {
        if self.capture == CaptureState::Recording {
            if let Err(e) = self.device.stop().await {
                warn!("Capture device stop failed: {}", e);
            }
            if let Some(pump) = self.capture_pump.take() {
                let _ = pump.await;
            }
            self.capture_buffer = None;
            self.set_capture(CaptureState::Idle);
        }
    }

    // ===== Event handling =====

    /// Consume one queued event. The driving loop calls this for every
    /// event the queue yields.
    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Push(PushEvent::Lifecycle(state)) => {
                self.set_transport(state);
            }

            SessionEvent::Push(PushEvent::Chat(response)) => {
                self.receive_reply(
                    response.session_id.clone(),
                    response.correlation_id,
                    None,
                    response.response,
                    response.timestamp.as_deref(),
                );
            }

            SessionEvent::Push(PushEvent::Voice(response)) => {
                // A push copy of a voice reply resolves the turn; the
                // submission round-trip still owns the capture lifecycle.
                self.receive_reply(
                    response.session_id.clone(),
                    response.correlation_id,
                    Some(response.transcribed_text.clone()),
                    response.response,
                    response.timestamp.as_deref(),
                );
            }

            SessionEvent::Push(PushEvent::Error(event)) => {
                if let Some(session) = &event.session_id {
                    if *session != self.session_id {
                        debug!("Discarding error event for stale session {}", session);
                        return;
                    }
                }
                let err = ChatError::backend(event.error);
                warn!("{}", err);
                match event.correlation_id {
                    Some(seq) => self.fail_turn(seq, &err),
                    None => self.notify(Notice::from_error(&err)),
                }
            }

            SessionEvent::ChatResult {
                correlation,
                result,
            } => {
                if correlation.session_id != self.session_id {
                    debug!(
                        "Discarding chat result for stale session {}",
                        correlation.session_id
                    );
                    return;
                }
                match result {
                    // The request's own correlation is authoritative for
                    // the fallback path; any body echo is ignored.
                    Ok(response) => self.receive_reply(
                        Some(correlation.session_id),
                        Some(correlation.seq),
                        None,
                        response.response,
                        response.timestamp.as_deref(),
                    ),
                    Err(e) => {
                        warn!("Chat dispatch failed: {}", e);
                        self.fail_turn(correlation.seq, &e);
                    }
                }
            }

            SessionEvent::VoiceResult {
                correlation,
                result,
            } => {
                // Processing settles to idle no matter what came back.
                if self.processing.as_ref() == Some(&correlation) {
                    self.processing = None;
                    self.set_capture(CaptureState::Idle);
                }

                if correlation.session_id != self.session_id {
                    debug!(
                        "Discarding voice result for stale session {}",
                        correlation.session_id
                    );
                    return;
                }

                match result {
                    Ok(response) => self.receive_reply(
                        Some(correlation.session_id),
                        Some(correlation.seq),
                        Some(response.transcribed_text.clone()),
                        response.response,
                        response.timestamp.as_deref(),
                    ),
                    Err(e) => {
                        warn!("Voice submission failed: {}", e);
                        self.fail_turn(correlation.seq, &e);
                    }
                }
            }

            SessionEvent::Fault(e) => {
                warn!("{}", e);
                self.notify(Notice::from_error(&e));
            }
        }
    }

    // ===== Internals =====

    /// Resolve an assistant reply against the turn ledger.
    ///
    /// Stale sessions are discarded fail-safe; duplicates (same turn
    /// already resolved) are dropped; a reply without a correlation
    /// attaches to the oldest in-flight turn.
    fn receive_reply(
        &mut self,
        session_id: Option<String>,
        correlation_id: Option<u64>,
        transcribed: Option<String>,
        response: String,
        timestamp: Option<&str>,
    ) {
        let session = session_id.unwrap_or_else(|| self.session_id.clone());
        if session != self.session_id {
            debug!("Discarding reply for stale session {}", session);
            return;
        }

        let seq = match correlation_id.or_else(|| self.turns.oldest_in_flight()) {
            Some(seq) => seq,
            None => {
                debug!("Reply with no turn to attach to; dropped");
                return;
            }
        };

        let source = match self.turns.source_of(seq) {
            Some(source) => source,
            None => {
                debug!("Reply for unknown turn {}; dropped", seq);
                return;
            }
        };

        let user = transcribed.map(|text| Message::user(text, MessageSource::Voice));
        let assistant = Message::assistant(response, source, parse_timestamp(timestamp));

        if !self.turns.resolve(seq, user.clone(), assistant.clone()) {
            debug!("Duplicate reply for turn {}; dropped", seq);
            return;
        }

        if let Some(user) = user {
            self.emit(SessionOutput::Message(user));
        }
        self.emit(SessionOutput::Message(assistant.clone()));

        self.persist_confirmed();
        self.speak(&assistant.content);
    }

    /// Mark a turn failed and tell the user. Failures for unknown or
    /// settled turns only get logged.
    fn fail_turn(&mut self, seq: u64, err: &ChatError) {
        if self.turns.fail(seq) {
            self.notify(Notice::from_error(err));
        } else {
            debug!("Failure for unknown or settled turn {}: {}", seq, err);
        }
    }

    /// Persist the confirmed conversation: stored prefix plus completed
    /// turns, trimmed to the optional bound. Never includes failed or
    /// in-flight turns.
    fn persist_confirmed(&mut self) {
        let mut messages: Vec<Message> = self
            .stored
            .iter()
            .cloned()
            .chain(self.turns.confirmed().cloned())
            .collect();

        if let Some(max) = self.config.max_stored {
            let excess = messages.len().saturating_sub(max);
            if excess > 0 {
                messages.drain(..excess);
            }
        }

        if let Err(e) = self.store.save(&StoredHistory::new(messages)) {
            warn!("Failed to persist history: {}", e);
            self.notify(Notice::from_error(&e));
        }
    }

    /// Synthesize and play a reply off the critical path.
    fn speak(&mut self, text: &str) {
        if !self.config.speak_replies {
            return;
        }
        let Some(sink) = self.playback.clone() else {
            return;
        };

        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            match backend.synthesize(&text).await {
                Ok(audio) => {
                    if let Err(e) = sink.play(&audio).await {
                        let _ = events.send(SessionEvent::Fault(e)).await;
                    }
                }
                Err(e) => {
                    let _ = events.send(SessionEvent::Fault(e)).await;
                }
            }
        });
    }

    fn set_transport(&mut self, state: TransportState) {
        if self.transport != state {
            info!("Transport state: {:?} -> {:?}", self.transport, state);
            self.transport = state;
            self.emit(SessionOutput::Transport(state));
        }
    }

    fn set_capture(&mut self, state: CaptureState) {
        if self.capture != state {
            debug!("Capture state: {:?} -> {:?}", self.capture, state);
            self.capture = state;
            self.emit(SessionOutput::Capture(state));
        }
    }

    fn emit(&self, output: SessionOutput) {
        if let Some(tx) = &self.outputs {
            let _ = tx.send(output);
        }
    }

    fn notify(&mut self, notice: Notice) {
        self.notices.post(notice.clone());
        self.emit(SessionOutput::Notice(notice));
    }
}

fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
