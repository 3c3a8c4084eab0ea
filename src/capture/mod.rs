pub mod buffer;
pub mod device;
pub mod file;

pub use buffer::{CaptureBuffer, VoiceClip};
pub use device::{AudioFrame, CaptureConfig, CaptureDevice, UnavailableDevice};
pub use file::WavFileDevice;

use serde::Serialize;

/// Voice capture lifecycle. Transitions only move along the cycle
/// idle -> recording -> processing -> idle; processing is never terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    /// No capture active, device released.
    Idle,
    /// Device held, frames being buffered.
    Recording,
    /// Device released, clip submitted and awaiting the backend.
    Processing,
}
