//! Opus backend on top of libopus
//!
//! Thin wrapper over the `opus` crate. The encode output buffer is sized to
//! the single-frame bound, so libopus can never write a payload that the
//! packetizer would later refuse.

use super::{FrameDecoder, FrameEncoder};
use crate::error::{CodecError, Result};
use crate::types::{
    validate_bitrate, AudioFrame, CodecConfig, CodecInfo, EncodedFrame, OpusApplication,
    MAX_ENCODED_FRAME_SIZE, SAMPLES_PER_FRAME,
};

/// Longest frame libopus may hand back (120 ms at 48 kHz)
const MAX_DECODE_SAMPLES: usize = 5760;

fn channels(config: &CodecConfig) -> Result<opus::Channels> {
    match config.channels {
        1 => Ok(opus::Channels::Mono),
        2 => Ok(opus::Channels::Stereo),
        n => Err(CodecError::invalid_config(format!("{} channels", n))),
    }
}

fn application(app: OpusApplication) -> opus::Application {
    match app {
        OpusApplication::Voip => opus::Application::Voip,
        OpusApplication::Audio => opus::Application::Audio,
        OpusApplication::LowDelay => opus::Application::LowDelay,
    }
}

/// libopus encoder
pub struct OpusEncoder {
    inner: opus::Encoder,
    config: CodecConfig,
    buffer: Vec<u8>,
}

impl OpusEncoder {
    /// Create a new encoder and apply the configured bitrate
    pub fn new(config: CodecConfig) -> Result<Self> {
        config.validate()?;
        let mut inner = opus::Encoder::new(
            config.sample_rate,
            channels(&config)?,
            application(config.application),
        )
        .map_err(|e| CodecError::initialization_failed(e.to_string()))?;
        inner.set_bitrate(opus::Bitrate::Bits(config.bitrate as i32))?;

        tracing::debug!(
            "Created Opus encoder: {}Hz, {} ch, {}bps",
            config.sample_rate,
            config.channels,
            config.bitrate
        );

        Ok(Self {
            inner,
            config,
            buffer: vec![0u8; MAX_ENCODED_FRAME_SIZE],
        })
    }
}

impl FrameEncoder for OpusEncoder {
    fn encode(&mut self, frame: &AudioFrame) -> Result<EncodedFrame> {
        let len = self
            .inner
            .encode(frame.samples(), &mut self.buffer)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        EncodedFrame::new(self.buffer[..len].to_vec())
    }

    fn set_bitrate(&mut self, bitrate: u32) -> Result<()> {
        validate_bitrate(bitrate)?;
        self.inner.set_bitrate(opus::Bitrate::Bits(bitrate as i32))?;
        self.config.bitrate = bitrate;
        Ok(())
    }

    fn bitrate(&self) -> u32 {
        self.config.bitrate
    }

    fn info(&self) -> CodecInfo {
        CodecInfo {
            name: "opus",
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            bitrate: self.config.bitrate,
            frame_size: self.config.frame_size,
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset_state()?;
        Ok(())
    }
}

/// libopus decoder
pub struct OpusDecoder {
    inner: opus::Decoder,
    config: CodecConfig,
    buffer: Vec<i16>,
}

impl OpusDecoder {
    /// Create a new decoder
    pub fn new(config: CodecConfig) -> Result<Self> {
        config.validate()?;
        let inner = opus::Decoder::new(config.sample_rate, channels(&config)?)
            .map_err(|e| CodecError::initialization_failed(e.to_string()))?;
        Ok(Self {
            inner,
            config,
            buffer: vec![0i16; MAX_DECODE_SAMPLES],
        })
    }
}

impl FrameDecoder for OpusDecoder {
    fn decode(&mut self, frame: &EncodedFrame) -> Result<AudioFrame> {
        let decoded = self
            .inner
            .decode(frame.data(), &mut self.buffer, false)
            .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
        if decoded != SAMPLES_PER_FRAME {
            return Err(CodecError::InvalidFrameSize {
                expected: SAMPLES_PER_FRAME,
                actual: decoded,
            });
        }
        AudioFrame::from_samples(self.buffer[..decoded].to_vec())
    }

    fn info(&self) -> CodecInfo {
        CodecInfo {
            name: "opus",
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            bitrate: self.config.bitrate,
            frame_size: self.config.frame_size,
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset_state()?;
        Ok(())
    }
}
