// Utterance buffer: accumulates capture frames in memory and finalizes
// them into a single WAV payload for the transcription endpoint.

use std::io::Cursor;

use tracing::warn;

use super::device::{AudioFrame, CaptureConfig};
use crate::error::ChatError;

/// A finished utterance, encoded as a WAV payload.
#[derive(Debug, Clone)]
pub struct VoiceClip {
    /// Complete WAV file bytes (header + samples).
    pub wav: Vec<u8>,
    /// Clip length in milliseconds.
    pub duration_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Accumulates frames for the capture currently in progress.
///
/// The format is locked to the configured capture format; frames that do
/// not match are dropped with a warning rather than corrupting the clip.
#[derive(Debug)]
pub struct CaptureBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
    frames: usize,
}

impl CaptureBuffer {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate: config.sample_rate,
            channels: config.channels,
            frames: 0,
        }
    }

    /// Append one frame to the clip.
    pub fn push(&mut self, frame: &AudioFrame) {
        if frame.sample_rate != self.sample_rate {
            warn!(
                "Frame sample rate mismatch: expected {}, got {}. Dropping frame.",
                self.sample_rate, frame.sample_rate
            );
            return;
        }

        if frame.channels != self.channels {
            warn!(
                "Frame channel count mismatch: expected {}, got {}. Dropping frame.",
                self.channels, frame.channels
            );
            return;
        }

        self.samples.extend_from_slice(&frame.samples);
        self.frames += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn duration_ms(&self) -> u64 {
        let samples_per_ms = (self.sample_rate as u64 * self.channels as u64) / 1000;
        if samples_per_ms == 0 {
            return 0;
        }
        self.samples.len() as u64 / samples_per_ms
    }

    /// Encode the accumulated samples as a complete WAV file in memory.
    pub fn finalize(self) -> Result<VoiceClip, ChatError> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let duration_ms = self.duration_ms();
        let mut wav = Vec::new();
        {
            let cursor = Cursor::new(&mut wav);
            let mut writer = hound::WavWriter::new(cursor, spec)
                .map_err(|e| ChatError::serialization(format!("WAV writer: {}", e)))?;

            for &sample in &self.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| ChatError::serialization(format!("WAV sample: {}", e)))?;
            }

            writer
                .finalize()
                .map_err(|e| ChatError::serialization(format!("WAV finalize: {}", e)))?;
        }

        Ok(VoiceClip {
            wav,
            duration_ms,
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }
}
