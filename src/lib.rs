pub mod capture;
pub mod config;
pub mod error;
pub mod history;
pub mod notify;
pub mod playback;
pub mod session;
pub mod transport;

pub use capture::{
    AudioFrame, CaptureBuffer, CaptureConfig, CaptureDevice, CaptureState, UnavailableDevice,
    VoiceClip, WavFileDevice,
};
pub use config::Config;
pub use error::ChatError;
pub use history::{FileHistoryStore, HistoryStore, StoredHistory};
pub use notify::{Notice, NoticeBoard, NoticeKind};
pub use playback::{SpeechPlayback, SpoolPlayback};
pub use session::{
    Message, MessageSource, Role, SessionConfig, SessionController, SessionEvent, SessionOutput,
    SessionStats,
};
pub use transport::{
    BackendClient, ChatBackend, ChatMessage, ChatResponse, ErrorMessage, HealthResponse, HttpApi,
    PushChannel, PushEvent, SynthesizeRequest, SynthesizeResponse, TransportState, VoiceResponse,
};
