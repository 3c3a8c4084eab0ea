use anyhow::Result;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Capture format requested from the device
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate
    pub sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub frame_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz mono is what the transcription service expects
            channels: 1,
            frame_duration_ms: 100,
        }
    }
}

/// Microphone seam.
///
/// `start` acquires the device and hands back a frame stream; `stop` must
/// release the device unconditionally, even when the rest of the voice flow
/// fails afterwards. Implementations:
/// - WavFileDevice: replays a WAV file as if it were a live microphone
/// - UnavailableDevice: stands in when no input is configured
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. Denial
    /// and device failures are reported as errors; the session layer turns
    /// them into permission notices.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if the device is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// Device used when no audio input is configured. Every start attempt is
/// reported as a denial so the session surfaces the right notice.
pub struct UnavailableDevice;

#[async_trait::async_trait]
impl CaptureDevice for UnavailableDevice {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        anyhow::bail!("No audio input device is configured")
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
