//! Audio device seam
//!
//! The voice pipeline only needs two things from the platform: a push
//! callback carrying captured PCM, and a way to hand PCM back for rendering.
//! [`AudioIoPort`] captures exactly that; [`MemoryAudioPort`] implements it
//! without hardware and the `device-cpal` feature adds a real backend.

use std::sync::Arc;

use crate::error::AudioResult;
use crate::format::AudioFormat;

pub mod memory;

#[cfg(feature = "device-cpal")]
pub mod cpal;

pub use memory::MemoryAudioPort;

#[cfg(feature = "device-cpal")]
pub use self::cpal::CpalAudioPort;

/// Callback receiving captured little-endian PCM in device-sized chunks.
///
/// Runs on the device's capture thread and must not block.
pub type CaptureSink = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Platform audio input/output
pub trait AudioIoPort: Send + Sync {
    /// Device name for logs and errors
    fn name(&self) -> &str;

    /// Format the device delivers and accepts
    fn format(&self) -> AudioFormat;

    /// Start capture; `sink` is called with every captured chunk
    fn start_capture(&self, sink: CaptureSink) -> AudioResult<()>;

    /// Stop capture; the sink is released and no longer called
    fn stop_capture(&self) -> AudioResult<()>;

    /// Whether capture is running
    fn is_capturing(&self) -> bool;

    /// Queue PCM for playback
    fn write(&self, pcm: &[u8]) -> AudioResult<()>;
}
