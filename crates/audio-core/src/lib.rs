//! # Audio-Core: capture framing and the device seam
//!
//! Audio devices deliver PCM in arbitrary chunk sizes on their own threads.
//! This crate regroups that stream into fixed 20 ms frames
//! ([`FrameBuffer`], [`CapturePipeline`]), defines the platform seam
//! ([`AudioIoPort`]) and renders decoded frames ([`PlaybackPipeline`]).
//!
//! ```rust
//! use std::sync::Arc;
//! use rvoice_audio_core::{AudioIoPort, CapturePipeline, FrameSink, MemoryAudioPort};
//! use rvoice_codec_core::AudioFrame;
//!
//! let sink: Arc<dyn FrameSink> = Arc::new(|frame: &AudioFrame| {
//!     assert_eq!(frame.sample_count(), 960);
//! });
//! let pipeline = Arc::new(CapturePipeline::new(sink));
//!
//! let port = MemoryAudioPort::new("mic");
//! let feed = pipeline.clone();
//! port.start_capture(Arc::new(move |pcm: &[u8]| {
//!     feed.push(pcm);
//! }))?;
//! port.feed(&[0u8; 4000])?;
//! assert_eq!(pipeline.residue_len(), 160);
//! # Ok::<(), rvoice_audio_core::AudioError>(())
//! ```

#![warn(missing_docs)]

pub mod buffer;
pub mod device;
pub mod error;
pub mod format;
pub mod pipeline;

pub use buffer::{FrameBuffer, FrameBufferStats, FrameDrain, ResidueMode};
pub use device::{AudioIoPort, CaptureSink, MemoryAudioPort};
pub use error::{AudioError, AudioResult};
pub use format::AudioFormat;
pub use pipeline::{CapturePipeline, FrameSink, PlaybackPipeline, PlaybackStats};

#[cfg(feature = "device-cpal")]
pub use device::CpalAudioPort;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
