//! # Codec-Core: voice frames and the Opus encode/decode seam
//!
//! This crate defines the fixed-size PCM frame the rest of rvoice works in
//! (20 ms, 48 kHz, mono, 16-bit) and the encoder/decoder pair that turns those
//! frames into compressed payloads and back.
//!
//! ## Usage
//!
//! ```rust
//! use rvoice_codec_core::{AudioFrame, CodecConfig, Decoder, Encoder};
//!
//! let config = CodecConfig::voice();
//! let mut encoder = Encoder::try_new(config.clone())?;
//! let mut decoder = Decoder::try_new(config)?;
//!
//! let frame = AudioFrame::silence();
//! let encoded = encoder.encode(&frame)?;
//! let decoded = decoder.decode(&encoded)?;
//! assert_eq!(decoded.sample_count(), 960);
//! # Ok::<(), rvoice_codec_core::CodecError>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `opus`: libopus through the `opus` crate (requires the native library)
//! - `opus-sim`: deterministic simulation backend (enabled by default)

#![warn(missing_docs)]

pub mod codecs;
pub mod error;
pub mod types;

pub use codecs::{CodecFactory, Decoder, Encoder, FrameDecoder, FrameEncoder};
pub use error::{CodecError, Result};
pub use types::{
    AudioFrame, CodecBackend, CodecConfig, CodecInfo, EncodedFrame, OpusApplication,
    BYTES_PER_SAMPLE, CHANNELS, DEFAULT_BITRATE, FRAME_BYTES, FRAME_DURATION_MS, MAX_BITRATE,
    MAX_ENCODED_FRAME_SIZE, MIN_BITRATE, SAMPLES_PER_FRAME, SAMPLE_RATE,
};

/// Version information for the codec library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the codec library.
///
/// Logs which backend the build will use. Safe to call more than once.
pub fn init() -> Result<()> {
    match CodecBackend::preferred() {
        Some(backend) => {
            tracing::info!("Initializing codec-core v{} ({} backend)", VERSION, backend.name());
            Ok(())
        }
        None => Err(CodecError::feature_not_enabled("opus-sim")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_init() {
        assert!(init().is_ok());
    }
}
