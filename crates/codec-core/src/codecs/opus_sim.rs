//! Opus simulation backend
//!
//! Stands in for libopus when the native library is not available. Each
//! frame is a one-byte marker followed by the µ-law code of every sample, so
//! the output is lossy, deterministic and always [`SIM_FRAME_LEN`] bytes.
//! The decoder accepts nothing else, which gives tests a realistic
//! "malformed payload" path.

use super::companding::{compress_into, expand_into};
use super::{FrameDecoder, FrameEncoder};
use crate::error::{CodecError, Result};
use crate::types::{
    validate_bitrate, AudioFrame, CodecConfig, CodecInfo, EncodedFrame, SAMPLES_PER_FRAME,
};

/// First byte of every simulated frame (the TOC of a fullband 20 ms mono
/// CELT frame)
pub const SIM_FRAME_MARKER: u8 = 0xF8;

/// Length of one simulated encoded frame
pub const SIM_FRAME_LEN: usize = 1 + SAMPLES_PER_FRAME;

/// Simulated Opus encoder
pub struct OpusSimEncoder {
    config: CodecConfig,
    frames_encoded: u64,
}

impl OpusSimEncoder {
    /// Create a new simulated encoder
    pub fn new(config: CodecConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            frames_encoded: 0,
        })
    }
}

impl FrameEncoder for OpusSimEncoder {
    fn encode(&mut self, frame: &AudioFrame) -> Result<EncodedFrame> {
        let mut out = vec![0u8; SIM_FRAME_LEN];
        out[0] = SIM_FRAME_MARKER;
        compress_into(frame.samples(), &mut out[1..]);
        self.frames_encoded += 1;
        EncodedFrame::new(out)
    }

    fn set_bitrate(&mut self, bitrate: u32) -> Result<()> {
        validate_bitrate(bitrate)?;
        self.config.bitrate = bitrate;
        Ok(())
    }

    fn bitrate(&self) -> u32 {
        self.config.bitrate
    }

    fn info(&self) -> CodecInfo {
        CodecInfo {
            name: "opus-sim",
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            bitrate: self.config.bitrate,
            frame_size: self.config.frame_size,
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.frames_encoded = 0;
        Ok(())
    }
}

/// Simulated Opus decoder
pub struct OpusSimDecoder {
    config: CodecConfig,
}

impl OpusSimDecoder {
    /// Create a new simulated decoder
    pub fn new(config: CodecConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl FrameDecoder for OpusSimDecoder {
    fn decode(&mut self, frame: &EncodedFrame) -> Result<AudioFrame> {
        let data = frame.data();
        if data.len() != SIM_FRAME_LEN {
            return Err(CodecError::decoding_failed(format!(
                "payload of {} bytes is not a {} byte frame",
                data.len(),
                SIM_FRAME_LEN
            )));
        }
        if data[0] != SIM_FRAME_MARKER {
            return Err(CodecError::decoding_failed(format!(
                "unexpected frame marker 0x{:02x}",
                data[0]
            )));
        }
        let mut samples = vec![0i16; SAMPLES_PER_FRAME];
        expand_into(&data[1..], &mut samples);
        AudioFrame::from_samples(samples)
    }

    fn info(&self) -> CodecInfo {
        CodecInfo {
            name: "opus-sim",
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            bitrate: self.config.bitrate,
            frame_size: self.config.frame_size,
        }
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}
