use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::capture::CaptureConfig;
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub backend: BackendConfig,
    pub voice: VoiceConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Seconds a notice stays visible before it expires
    pub notice_ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend REST API
    pub base_url: String,
    /// NATS server URL; omit to run without the push channel
    pub nats_url: Option<String>,
    /// Timeout for HTTP requests, in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct VoiceConfig {
    /// WAV file replayed as microphone input; omit to run without capture
    pub input_wav: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Directory synthesized replies are written to; omit to disable playback
    pub playback_dir: Option<String>,
    pub speak_replies: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryConfig {
    /// History file path (`~` expands to the home directory)
    pub path: String,
    /// How many stored messages are restored into the view
    pub restore_limit: usize,
    /// Optional cap on stored history length
    pub max_stored: Option<usize>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// History file path with `~` expanded.
    pub fn history_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.history.path).into_owned())
    }

    /// Playback spool directory with `~` expanded, if configured.
    pub fn playback_dir(&self) -> Option<PathBuf> {
        self.voice
            .playback_dir
            .as_ref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    /// Session tunables derived from this file.
    pub fn session_config(&self) -> SessionConfig {
        let mut capture = CaptureConfig::default();
        capture.sample_rate = self.voice.sample_rate;
        capture.channels = self.voice.channels;

        SessionConfig {
            restore_limit: self.history.restore_limit,
            max_stored: self.history.max_stored,
            notice_ttl: Duration::from_secs(self.service.notice_ttl_secs),
            capture,
            speak_replies: self.voice.speak_replies,
        }
    }
}
