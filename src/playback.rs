//! Playback of synthesized assistant replies.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::fs;
use tracing::debug;

use crate::error::ChatError;

/// Local audio output seam for synthesized replies.
#[async_trait::async_trait]
pub trait SpeechPlayback: Send + Sync {
    /// Play one synthesized reply.
    async fn play(&self, audio: &[u8]) -> Result<(), ChatError>;

    /// Sink name for logging.
    fn name(&self) -> &str;
}

/// Writes each reply to a spool directory as a numbered file.
///
/// Gives the terminal client a concrete voice output without a platform
/// audio stack; an external player can watch the directory.
pub struct SpoolPlayback {
    dir: PathBuf,
    counter: AtomicUsize,
}

impl SpoolPlayback {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl SpeechPlayback for SpoolPlayback {
    async fn play(&self, audio: &[u8]) -> Result<(), ChatError> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            ChatError::serialization(format!("Failed to create spool dir: {}", e))
        })?;

        let index = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("reply-{:03}.wav", index));
        fs::write(&path, audio).await.map_err(|e| {
            ChatError::serialization(format!("Failed to write reply audio: {}", e))
        })?;

        debug!("Reply audio spooled: {:?} ({} bytes)", path, audio.len());
        Ok(())
    }

    fn name(&self) -> &str {
        "spool"
    }
}
