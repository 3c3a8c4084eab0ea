use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hound::WavReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::device::{AudioFrame, CaptureConfig, CaptureDevice};

/// Capture device that replays a WAV file as if it were a live microphone.
///
/// The CLI uses this when a capture fixture is configured; tests use it for
/// deterministic input. Paced mode emits frames at realtime speed, unpaced
/// mode streams the file as fast as the channel accepts it.
pub struct WavFileDevice {
    path: PathBuf,
    config: CaptureConfig,
    paced: bool,
    is_capturing: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl WavFileDevice {
    pub fn new(path: impl AsRef<Path>, config: CaptureConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            paced: true,
            is_capturing: Arc::new(AtomicBool::new(false)),
            pump: None,
        }
    }

    /// Disable realtime pacing. Frames are sent back to back.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

#[async_trait::async_trait]
impl CaptureDevice for WavFileDevice {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.is_capturing.load(Ordering::SeqCst) {
            anyhow::bail!("Capture already in progress");
        }

        let reader = WavReader::open(&self.path)
            .with_context(|| format!("Failed to open capture input: {:?}", self.path))?;
        let spec = reader.spec();

        // TODO: resample instead of rejecting mismatched fixtures
        if spec.sample_rate != self.config.sample_rate || spec.channels != self.config.channels {
            anyhow::bail!(
                "Resampling not supported. Expected {}Hz {}ch, got {}Hz {}ch",
                self.config.sample_rate,
                self.config.channels,
                spec.sample_rate,
                spec.channels
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);
        info!(
            "Capture input loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        let frame_ms = self.config.frame_duration_ms.max(1);
        let samples_per_frame =
            ((spec.sample_rate as u64 * spec.channels as u64 * frame_ms) / 1000).max(1) as usize;

        let (tx, rx) = mpsc::channel(32);
        self.is_capturing.store(true, Ordering::SeqCst);

        let flag = Arc::clone(&self.is_capturing);
        let paced = self.paced;
        let handle = tokio::spawn(async move {
            for (index, chunk) in samples.chunks(samples_per_frame).enumerate() {
                if !flag.load(Ordering::SeqCst) {
                    break;
                }

                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: spec.sample_rate,
                    channels: spec.channels,
                    timestamp_ms: index as u64 * frame_ms,
                };

                if tx.send(frame).await.is_err() {
                    break;
                }

                if paced {
                    tokio::time::sleep(Duration::from_millis(frame_ms)).await;
                }
            }

            // File exhausted or stopped; either way the device is idle.
            flag.store(false, Ordering::SeqCst);
        });
        self.pump = Some(handle);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.is_capturing.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pump.take() {
            let _ = handle.await;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
