// Integration tests for the session controller
//
// These drive the controller the way a UI binding would: operations on the
// owner side, scripted backend and device fakes underneath, and the event
// queue drained between steps. Everything runs on the current-thread test
// runtime, so spawned dispatch tasks only make progress at yield points and
// each test settles deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::mpsc;

use emma_chat::{
    AudioFrame, CaptureDevice, CaptureState, ChatBackend, ChatError, ChatMessage, ChatResponse,
    ErrorMessage, FileHistoryStore, HealthResponse, HistoryStore, Message, MessageSource,
    NoticeKind, PushEvent, Role, SessionConfig, SessionController, SessionOutput, StoredHistory,
    TransportState, VoiceClip, VoiceResponse,
};

/// Backend fake driven by queued replies.
///
/// Counters record which dispatch path each message took; the hold flag
/// parks transcription so tests can observe the processing state.
struct ScriptedBackend {
    push_sends: AtomicUsize,
    chat_calls: AtomicUsize,
    transcribe_calls: AtomicUsize,
    chat_replies: Mutex<VecDeque<Result<ChatResponse, ChatError>>>,
    voice_replies: Mutex<VecDeque<Result<VoiceResponse, ChatError>>>,
    hold_transcribe: AtomicBool,
}

impl ScriptedBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            push_sends: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            transcribe_calls: AtomicUsize::new(0),
            chat_replies: Mutex::new(VecDeque::new()),
            voice_replies: Mutex::new(VecDeque::new()),
            hold_transcribe: AtomicBool::new(false),
        })
    }

    fn queue_chat(&self, reply: Result<ChatResponse, ChatError>) {
        self.chat_replies.lock().unwrap().push_back(reply);
    }

    fn queue_voice(&self, reply: Result<VoiceResponse, ChatError>) {
        self.voice_replies.lock().unwrap().push_back(reply);
    }
}

#[async_trait::async_trait]
impl ChatBackend for ScriptedBackend {
    async fn push_chat(&self, _message: &ChatMessage) -> Result<(), ChatError> {
        self.push_sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn http_chat(&self, message: &ChatMessage) -> Result<ChatResponse, ChatError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.chat_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ChatResponse {
                    response: format!("echo: {}", message.message),
                    timestamp: None,
                    session_id: Some(message.session_id.clone()),
                    correlation_id: Some(message.correlation_id),
                })
            })
    }

    async fn transcribe(
        &self,
        _clip: &VoiceClip,
        session_id: &str,
        correlation_id: u64,
    ) -> Result<VoiceResponse, ChatError> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        while self.hold_transcribe.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        self.voice_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(VoiceResponse {
                    transcribed_text: "transcribed".to_string(),
                    response: "voice reply".to_string(),
                    timestamp: None,
                    session_id: Some(session_id.to_string()),
                    correlation_id: Some(correlation_id),
                })
            })
    }

    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, ChatError> {
        Ok(Vec::new())
    }

    async fn health(&self) -> Result<HealthResponse, ChatError> {
        Ok(HealthResponse {
            status: "ok".to_string(),
            services: Default::default(),
        })
    }
}

/// Capture device fake. All scripted frames are queued up front, so the
/// frame channel closes as soon as they are consumed.
struct ScriptedDevice {
    frames: Vec<AudioFrame>,
    deny: bool,
    active: bool,
    starts: Arc<AtomicUsize>,
}

impl ScriptedDevice {
    fn with_frames(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames,
            deny: false,
            active: false,
            starts: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn idle() -> Self {
        Self::with_frames(Vec::new())
    }

    fn denied() -> Self {
        Self {
            deny: true,
            ..Self::idle()
        }
    }

    fn start_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.starts)
    }
}

#[async_trait::async_trait]
impl CaptureDevice for ScriptedDevice {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.deny {
            anyhow::bail!("Microphone permission denied");
        }
        let (tx, rx) = mpsc::channel(self.frames.len().max(1));
        for frame in &self.frames {
            tx.send(frame.clone()).await?;
        }
        self.active = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.active
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// History store that always fails, for degraded-storage tests.
struct FailingStore;

impl HistoryStore for FailingStore {
    fn load(&self) -> Result<StoredHistory, ChatError> {
        Err(ChatError::serialization("disk unavailable"))
    }

    fn save(&self, _history: &StoredHistory) -> Result<(), ChatError> {
        Err(ChatError::serialization("disk unavailable"))
    }
}

fn frames(count: usize) -> Vec<AudioFrame> {
    (0..count)
        .map(|i| AudioFrame {
            samples: vec![0i16; 1600],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: i as u64 * 100,
        })
        .collect()
}

fn controller_with(
    backend: Arc<ScriptedBackend>,
    device: ScriptedDevice,
    dir: &TempDir,
) -> SessionController {
    let store = Box::new(FileHistoryStore::new(dir.path().join("history.json")));
    SessionController::new(SessionConfig::default(), backend, Box::new(device), store)
}

/// Let spawned dispatch tasks run, then fold their results back into the
/// controller. Two rounds cover tasks that queue follow-up work.
async fn settle(controller: &mut SessionController) {
    for _ in 0..2 {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        controller.drain_events().await;
    }
}

fn capture_states(outputs: &mut mpsc::UnboundedReceiver<SessionOutput>) -> Vec<CaptureState> {
    let mut states = Vec::new();
    while let Ok(output) = outputs.try_recv() {
        if let SessionOutput::Capture(state) = output {
            states.push(state);
        }
    }
    states
}

fn load_stored(dir: &TempDir) -> StoredHistory {
    let raw = std::fs::read_to_string(dir.path().join("history.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

// ===== Typed messaging =====

#[tokio::test]
async fn test_typed_message_renders_before_reply() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    let seq = controller.send_typed_message("I need to book an appointment").await;
    assert_eq!(seq, Some(0));

    // The user's message is visible while the dispatch is still in flight.
    let pending = controller.messages();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].role, Role::User);
    assert_eq!(pending[0].source, MessageSource::Typed);

    settle(&mut controller).await;

    let after = controller.messages();
    assert_eq!(after.len(), 2);
    assert_eq!(after[1].role, Role::Assistant);
    Ok(())
}

#[tokio::test]
async fn test_empty_input_is_a_silent_no_op() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    assert_eq!(controller.send_typed_message("").await, None);
    assert_eq!(controller.send_typed_message("   \t  ").await, None);
    settle(&mut controller).await;

    // Nothing rendered, nothing wired out, nothing to notice.
    assert!(controller.messages().is_empty());
    assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 0);
    assert_eq!(backend.push_sends.load(Ordering::SeqCst), 0);
    assert!(controller.notices().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_dispatch_is_exclusive_per_transport_state() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    // Disconnected at startup: the HTTP fallback carries the message.
    controller.send_typed_message("offline question").await;
    settle(&mut controller).await;
    assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.push_sends.load(Ordering::SeqCst), 0);

    // Connected: the push channel carries it, and only the push channel.
    controller
        .handle_event(PushEvent::Lifecycle(TransportState::Connected).into())
        .await;
    controller.send_typed_message("online question").await;
    settle(&mut controller).await;
    assert_eq!(
        backend.chat_calls.load(Ordering::SeqCst),
        1,
        "no fallback dispatch while connected"
    );
    assert_eq!(backend.push_sends.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_push_reply_resolves_the_turn() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    controller
        .handle_event(PushEvent::Lifecycle(TransportState::Connected).into())
        .await;
    controller.send_typed_message("hello").await;
    settle(&mut controller).await;

    let reply = ChatResponse {
        response: "Hi! How can I help?".to_string(),
        timestamp: Some("2026-03-01T09:30:00Z".to_string()),
        session_id: Some(controller.session_id().to_string()),
        correlation_id: Some(0),
    };
    controller.handle_event(PushEvent::Chat(reply).into()).await;

    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Hi! How can I help?");
    // The backend timestamp is honored when it parses.
    assert_eq!(messages[1].timestamp.to_rfc3339(), "2026-03-01T09:30:00+00:00");
    Ok(())
}

#[tokio::test]
async fn test_duplicate_replies_render_once() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    controller
        .handle_event(PushEvent::Lifecycle(TransportState::Connected).into())
        .await;
    controller.send_typed_message("hello").await;
    settle(&mut controller).await;

    let reply = ChatResponse {
        response: "answer".to_string(),
        timestamp: None,
        session_id: Some(controller.session_id().to_string()),
        correlation_id: Some(0),
    };

    // Same correlation delivered twice; the second copy is dropped.
    controller
        .handle_event(PushEvent::Chat(reply.clone()).into())
        .await;
    controller.handle_event(PushEvent::Chat(reply).into()).await;

    assert_eq!(controller.messages().len(), 2);
    assert_eq!(load_stored(&temp).messages.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_out_of_order_replies_keep_action_order() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    controller
        .handle_event(PushEvent::Lifecycle(TransportState::Connected).into())
        .await;
    controller.send_typed_message("first question").await;
    controller.send_typed_message("second question").await;
    settle(&mut controller).await;

    let session = controller.session_id().to_string();
    for (seq, text) in [(1u64, "second answer"), (0u64, "first answer")] {
        controller
            .handle_event(
                PushEvent::Chat(ChatResponse {
                    response: text.to_string(),
                    timestamp: None,
                    session_id: Some(session.clone()),
                    correlation_id: Some(seq),
                })
                .into(),
            )
            .await;
    }

    // The view follows user-action order, not arrival order.
    let contents: Vec<String> = controller
        .messages()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(
        contents,
        vec![
            "first question",
            "first answer",
            "second question",
            "second answer"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_reply_without_correlation_attaches_to_oldest_turn() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    controller
        .handle_event(PushEvent::Lifecycle(TransportState::Connected).into())
        .await;
    controller.send_typed_message("oldest").await;
    controller.send_typed_message("newest").await;
    settle(&mut controller).await;

    controller
        .handle_event(
            PushEvent::Chat(ChatResponse {
                response: "goes to the oldest".to_string(),
                timestamp: None,
                session_id: None,
                correlation_id: None,
            })
            .into(),
        )
        .await;

    let contents: Vec<String> = controller
        .messages()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["oldest", "goes to the oldest", "newest"]);
    assert_eq!(controller.stats().turns_in_flight, 1);
    Ok(())
}

// ===== Correlation and session staleness =====

#[tokio::test]
async fn test_stale_push_reply_is_discarded() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    controller
        .handle_event(PushEvent::Lifecycle(TransportState::Connected).into())
        .await;
    controller.send_typed_message("hello").await;
    settle(&mut controller).await;

    controller
        .handle_event(
            PushEvent::Chat(ChatResponse {
                response: "from another life".to_string(),
                timestamp: None,
                session_id: Some("session-someone-else".to_string()),
                correlation_id: Some(0),
            })
            .into(),
        )
        .await;

    // The reply never renders and the turn stays open.
    assert_eq!(controller.messages().len(), 1);
    assert_eq!(controller.stats().turns_in_flight, 1);
    Ok(())
}

#[tokio::test]
async fn test_reset_discards_replies_still_in_flight() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    // Dispatch over the fallback, then reset before the task runs.
    controller.send_typed_message("about to be orphaned").await;
    controller.reset_session();
    settle(&mut controller).await;

    // The dispatch happened, but its result carried the old session id.
    assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 1);
    assert!(controller.messages().is_empty());
    assert!(controller.full_history().messages.is_empty());
    assert!(controller.notices().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_reset_clears_view_and_storage_and_rotates_id() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    controller.send_typed_message("remember me").await;
    settle(&mut controller).await;
    assert_eq!(controller.messages().len(), 2);
    assert_eq!(load_stored(&temp).messages.len(), 2);

    let old_id = controller.session_id().to_string();
    let new_id = controller.reset_session();

    assert_ne!(old_id, new_id);
    assert_eq!(controller.session_id(), new_id);
    assert!(controller.messages().is_empty());
    assert!(load_stored(&temp).messages.is_empty());
    Ok(())
}

// ===== Restore and persistence =====

#[tokio::test]
async fn test_restore_caps_view_but_not_storage() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("history.json");

    // Seed eight stored messages from an earlier run.
    let mut seeded = Vec::new();
    for i in 0..4 {
        seeded.push(Message::user(format!("question {}", i), MessageSource::Typed));
        seeded.push(Message::assistant(
            format!("answer {}", i),
            MessageSource::Typed,
            Utc::now(),
        ));
    }
    FileHistoryStore::new(&path).save(&StoredHistory::new(seeded))?;

    let backend = ScriptedBackend::new();
    let mut controller = SessionController::new(
        SessionConfig::default(),
        backend.clone(),
        Box::new(ScriptedDevice::idle()),
        Box::new(FileHistoryStore::new(&path)),
    );

    // Only the tail is replayed into the view.
    let visible = controller.messages();
    assert_eq!(visible.len(), 5);
    assert_eq!(visible[0].content, "answer 1");
    assert_eq!(visible[4].content, "answer 3");

    // The stored sequence is untouched by the cap.
    assert_eq!(controller.full_history().messages.len(), 8);
    assert_eq!(load_stored(&temp).messages.len(), 8);

    // New exchanges append to the full stored sequence.
    controller.send_typed_message("a new question").await;
    settle(&mut controller).await;
    assert_eq!(controller.messages().len(), 7);
    assert_eq!(load_stored(&temp).messages.len(), 10);
    Ok(())
}

#[tokio::test]
async fn test_failed_send_stays_visible_but_unpersisted() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    backend.queue_chat(Err(ChatError::network("connection refused")));
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    controller.send_typed_message("did this go through?").await;
    settle(&mut controller).await;

    // The user still sees what they typed, plus a delivery notice.
    let messages = controller.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);

    let notices = controller.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Network);

    // Failed turns never reach durable history.
    assert!(controller.full_history().messages.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_booking_reply_rendered_and_persisted_once() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    backend.queue_chat(Ok(ChatResponse {
        response: "Sure, what time works for you?".to_string(),
        timestamp: None,
        session_id: None,
        correlation_id: Some(0),
    }));
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    controller.send_typed_message("I need to book an appointment").await;
    settle(&mut controller).await;

    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Sure, what time works for you?");

    // A push copy of the same reply changes nothing.
    controller
        .handle_event(
            PushEvent::Chat(ChatResponse {
                response: "Sure, what time works for you?".to_string(),
                timestamp: None,
                session_id: Some(controller.session_id().to_string()),
                correlation_id: Some(0),
            })
            .into(),
        )
        .await;

    assert_eq!(controller.messages().len(), 2);
    let stored = load_stored(&temp);
    assert_eq!(stored.messages.len(), 2);
    assert_eq!(stored.messages[1].content, "Sure, what time works for you?");
    Ok(())
}

#[tokio::test]
async fn test_backend_error_event_fails_the_turn() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    controller
        .handle_event(PushEvent::Lifecycle(TransportState::Connected).into())
        .await;
    controller.send_typed_message("hello").await;
    settle(&mut controller).await;

    controller
        .handle_event(
            PushEvent::Error(ErrorMessage {
                error: "language model unavailable".to_string(),
                session_id: Some(controller.session_id().to_string()),
                correlation_id: Some(0),
            })
            .into(),
        )
        .await;

    assert_eq!(controller.messages().len(), 1);
    let notices = controller.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Backend);
    assert!(controller.full_history().messages.is_empty());
    assert_eq!(controller.stats().turns_in_flight, 0);
    Ok(())
}

#[tokio::test]
async fn test_storage_failure_degrades_to_notices() -> Result<()> {
    let backend = ScriptedBackend::new();
    let mut controller = SessionController::new(
        SessionConfig::default(),
        backend.clone(),
        Box::new(ScriptedDevice::idle()),
        Box::new(FailingStore),
    );

    // The failed restore surfaces as a notice, not a crash.
    let notices = controller.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Storage);

    // Chatting still works; each failed persist adds its own notice.
    controller.send_typed_message("still works").await;
    settle(&mut controller).await;
    assert_eq!(controller.messages().len(), 2);
    assert_eq!(controller.notices().len(), 2);
    Ok(())
}

// ===== Voice capture =====

#[tokio::test]
async fn test_voice_flow_end_to_end() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::with_frames(frames(3)), &temp);
    let mut outputs = controller.watch_outputs();

    controller.start_capture().await;
    assert_eq!(controller.capture_state(), CaptureState::Recording);

    controller.stop_capture().await;
    assert_eq!(controller.capture_state(), CaptureState::Processing);

    settle(&mut controller).await;
    assert_eq!(controller.capture_state(), CaptureState::Idle);

    // The state machine moved through the full cycle, in order.
    assert_eq!(
        capture_states(&mut outputs),
        vec![
            CaptureState::Recording,
            CaptureState::Processing,
            CaptureState::Idle
        ]
    );

    // Transcription and reply both render, both marked as voice.
    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "transcribed");
    assert_eq!(messages[0].source, MessageSource::Voice);
    assert_eq!(messages[1].content, "voice reply");
    assert_eq!(messages[1].source, MessageSource::Voice);
    assert_eq!(backend.transcribe_calls.load(Ordering::SeqCst), 1);

    assert_eq!(load_stored(&temp).messages.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_capture_start_rejected_while_processing() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    backend.hold_transcribe.store(true, Ordering::SeqCst);

    let device = ScriptedDevice::with_frames(frames(2));
    let starts = device.start_counter();
    let mut controller = controller_with(backend.clone(), device, &temp);

    controller.start_capture().await;
    controller.stop_capture().await;
    assert_eq!(controller.capture_state(), CaptureState::Processing);

    // Start attempts while the clip is out for transcription do nothing.
    controller.start_capture().await;
    controller.toggle_capture().await;
    assert_eq!(controller.capture_state(), CaptureState::Processing);
    assert_eq!(starts.load(Ordering::SeqCst), 1, "device opened exactly once");

    backend.hold_transcribe.store(false, Ordering::SeqCst);
    settle(&mut controller).await;
    assert_eq!(controller.capture_state(), CaptureState::Idle);
    assert_eq!(controller.messages().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_empty_capture_posts_notice_without_submission() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    controller.start_capture().await;
    controller.stop_capture().await;
    settle(&mut controller).await;

    assert_eq!(controller.capture_state(), CaptureState::Idle);
    assert_eq!(backend.transcribe_calls.load(Ordering::SeqCst), 0);
    assert_eq!(controller.stats().turns_in_flight, 0);

    let notices = controller.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Info);
    Ok(())
}

#[tokio::test]
async fn test_microphone_denial_posts_notice_and_stays_idle() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::denied(), &temp);

    controller.start_capture().await;

    assert_eq!(controller.capture_state(), CaptureState::Idle);
    assert!(controller.messages().is_empty());
    assert_eq!(backend.transcribe_calls.load(Ordering::SeqCst), 0);

    let notices = controller.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::MicrophoneDenied);
    Ok(())
}

#[tokio::test]
async fn test_voice_failure_settles_idle_with_notice() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    backend.queue_voice(Err(ChatError::backend("transcription failed")));
    let mut controller = controller_with(backend.clone(), ScriptedDevice::with_frames(frames(2)), &temp);

    controller.start_capture().await;
    controller.stop_capture().await;
    settle(&mut controller).await;

    assert_eq!(controller.capture_state(), CaptureState::Idle);
    assert!(controller.messages().is_empty());
    assert!(controller.full_history().messages.is_empty());

    let notices = controller.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Backend);
    Ok(())
}

#[tokio::test]
async fn test_reset_while_processing_still_settles_idle() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    backend.hold_transcribe.store(true, Ordering::SeqCst);
    let mut controller = controller_with(backend.clone(), ScriptedDevice::with_frames(frames(2)), &temp);

    controller.start_capture().await;
    controller.stop_capture().await;
    assert_eq!(controller.capture_state(), CaptureState::Processing);

    // Reset while the clip is out for transcription.
    controller.reset_session();
    backend.hold_transcribe.store(false, Ordering::SeqCst);
    settle(&mut controller).await;

    // The late result settles the capture state machine but its content
    // belongs to the old session and is discarded.
    assert_eq!(controller.capture_state(), CaptureState::Idle);
    assert!(controller.messages().is_empty());
    assert!(controller.full_history().messages.is_empty());
    Ok(())
}

// ===== Stats =====

#[tokio::test]
async fn test_stats_snapshot() -> Result<()> {
    let temp = TempDir::new()?;
    let backend = ScriptedBackend::new();
    let mut controller = controller_with(backend.clone(), ScriptedDevice::idle(), &temp);

    controller.send_typed_message("hello").await;
    settle(&mut controller).await;

    let stats = controller.stats();
    assert_eq!(stats.session_id, controller.session_id());
    assert_eq!(stats.transport, TransportState::Disconnected);
    assert_eq!(stats.capture, CaptureState::Idle);
    assert_eq!(stats.visible_messages, 2);
    assert_eq!(stats.stored_messages, 2);
    assert_eq!(stats.turns_in_flight, 0);
    assert_eq!(stats.active_notices, 0);
    assert!(stats.duration_secs >= 0.0);
    Ok(())
}
