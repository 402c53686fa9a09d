//! Codec implementations and factory

use crate::error::{CodecError, Result};
use crate::types::{AudioFrame, CodecBackend, CodecConfig, CodecInfo, EncodedFrame};

pub mod companding;

#[cfg(feature = "opus")]
pub mod libopus;

#[cfg(feature = "opus-sim")]
pub mod opus_sim;

/// Backend-side encoder.
///
/// Implementations are moved between threads (capture callback, session
/// tasks) but never shared, hence `Send` without `Sync`.
pub trait FrameEncoder: Send {
    /// Encode one frame
    fn encode(&mut self, frame: &AudioFrame) -> Result<EncodedFrame>;

    /// Change the target bitrate without re-creating the encoder
    fn set_bitrate(&mut self, bitrate: u32) -> Result<()>;

    /// Current target bitrate
    fn bitrate(&self) -> u32;

    /// Codec description
    fn info(&self) -> CodecInfo;

    /// Drop internal prediction state
    fn reset(&mut self) -> Result<()>;
}

/// Backend-side decoder
pub trait FrameDecoder: Send {
    /// Decode one payload into exactly one frame
    fn decode(&mut self, frame: &EncodedFrame) -> Result<AudioFrame>;

    /// Codec description
    fn info(&self) -> CodecInfo;

    /// Drop internal state
    fn reset(&mut self) -> Result<()>;
}

/// Codec factory for creating encoder/decoder instances
pub struct CodecFactory;

impl CodecFactory {
    /// Create an encoder from configuration
    pub fn create_encoder(config: CodecConfig) -> Result<Box<dyn FrameEncoder>> {
        config.validate()?;

        match Self::backend(&config)? {
            #[cfg(feature = "opus")]
            CodecBackend::Opus => Ok(Box::new(libopus::OpusEncoder::new(config)?)),

            #[cfg(feature = "opus-sim")]
            CodecBackend::OpusSim => Ok(Box::new(opus_sim::OpusSimEncoder::new(config)?)),

            #[allow(unreachable_patterns)]
            backend => Err(CodecError::feature_not_enabled(backend.name())),
        }
    }

    /// Create a decoder from configuration
    pub fn create_decoder(config: CodecConfig) -> Result<Box<dyn FrameDecoder>> {
        config.validate()?;

        match Self::backend(&config)? {
            #[cfg(feature = "opus")]
            CodecBackend::Opus => Ok(Box::new(libopus::OpusDecoder::new(config)?)),

            #[cfg(feature = "opus-sim")]
            CodecBackend::OpusSim => Ok(Box::new(opus_sim::OpusSimDecoder::new(config)?)),

            #[allow(unreachable_patterns)]
            backend => Err(CodecError::feature_not_enabled(backend.name())),
        }
    }

    /// Backends compiled into this build
    pub fn available_backends() -> Vec<CodecBackend> {
        vec![
            #[cfg(feature = "opus")]
            CodecBackend::Opus,
            #[cfg(feature = "opus-sim")]
            CodecBackend::OpusSim,
        ]
    }

    fn backend(config: &CodecConfig) -> Result<CodecBackend> {
        config
            .backend
            .or_else(CodecBackend::preferred)
            .ok_or_else(|| CodecError::feature_not_enabled("opus-sim"))
    }
}

enum Slot<T> {
    Ready(T),
    Failed(CodecError),
    Disposed,
}

impl<T> Slot<T> {
    fn get(&mut self) -> Result<&mut T> {
        match self {
            Slot::Ready(inner) => Ok(inner),
            Slot::Failed(err) => Err(CodecError::initialization_failed(err.to_string())),
            Slot::Disposed => Err(CodecError::initialization_failed("codec disposed")),
        }
    }
}

/// Frame encoder used on the send path.
///
/// Built with [`Encoder::open`], an initialisation failure is kept and
/// reported by every later [`Encoder::encode`] call so the audio path can
/// count and drop frames instead of tearing the session down.
pub struct Encoder {
    slot: Slot<Box<dyn FrameEncoder>>,
    config: CodecConfig,
}

impl Encoder {
    /// Create an encoder, failing if the backend cannot be initialised
    pub fn try_new(config: CodecConfig) -> Result<Self> {
        let inner = CodecFactory::create_encoder(config.clone())?;
        Ok(Self {
            slot: Slot::Ready(inner),
            config,
        })
    }

    /// Create an encoder, deferring any initialisation error to `encode`
    pub fn open(config: CodecConfig) -> Self {
        let slot = match CodecFactory::create_encoder(config.clone()) {
            Ok(inner) => Slot::Ready(inner),
            Err(err) => {
                tracing::warn!("Encoder initialisation failed: {}", err);
                Slot::Failed(err)
            }
        };
        Self { slot, config }
    }

    /// Encode one frame.
    ///
    /// Fails when the frame does not match the configured frame size or the
    /// encoder never initialised.
    pub fn encode(&mut self, frame: &AudioFrame) -> Result<EncodedFrame> {
        if frame.sample_count() != self.config.frame_size {
            return Err(CodecError::InvalidFrameSize {
                expected: self.config.frame_size,
                actual: frame.sample_count(),
            });
        }
        self.slot.get()?.encode(frame)
    }

    /// Apply a new target bitrate to the running encoder
    pub fn set_bitrate(&mut self, bitrate: u32) -> Result<()> {
        crate::types::validate_bitrate(bitrate)?;
        if let Slot::Ready(inner) = &mut self.slot {
            inner.set_bitrate(bitrate)?;
        }
        self.config.bitrate = bitrate;
        tracing::debug!("Encoder bitrate set to {}bps", bitrate);
        Ok(())
    }

    /// Current target bitrate
    pub fn bitrate(&self) -> u32 {
        self.config.bitrate
    }

    /// Whether the backend initialised and has not been disposed
    pub fn is_ready(&self) -> bool {
        matches!(self.slot, Slot::Ready(_))
    }

    /// Codec description, if the backend is alive
    pub fn info(&self) -> Option<CodecInfo> {
        match &self.slot {
            Slot::Ready(inner) => Some(inner.info()),
            _ => None,
        }
    }

    /// Release the backend; later `encode` calls fail
    pub fn dispose(&mut self) {
        self.slot = Slot::Disposed;
    }
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("config", &self.config)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Frame decoder used on the receive path
pub struct Decoder {
    slot: Slot<Box<dyn FrameDecoder>>,
    config: CodecConfig,
}

impl Decoder {
    /// Create a decoder, failing if the backend cannot be initialised
    pub fn try_new(config: CodecConfig) -> Result<Self> {
        let inner = CodecFactory::create_decoder(config.clone())?;
        Ok(Self {
            slot: Slot::Ready(inner),
            config,
        })
    }

    /// Create a decoder, deferring any initialisation error to `decode`
    pub fn open(config: CodecConfig) -> Self {
        let slot = match CodecFactory::create_decoder(config.clone()) {
            Ok(inner) => Slot::Ready(inner),
            Err(err) => {
                tracing::warn!("Decoder initialisation failed: {}", err);
                Slot::Failed(err)
            }
        };
        Self { slot, config }
    }

    /// Decode one payload into exactly one frame; never yields a partial frame
    pub fn decode(&mut self, frame: &EncodedFrame) -> Result<AudioFrame> {
        let decoded = self.slot.get()?.decode(frame)?;
        if decoded.sample_count() != self.config.frame_size {
            return Err(CodecError::InvalidFrameSize {
                expected: self.config.frame_size,
                actual: decoded.sample_count(),
            });
        }
        Ok(decoded)
    }

    /// Whether the backend initialised and has not been disposed
    pub fn is_ready(&self) -> bool {
        matches!(self.slot, Slot::Ready(_))
    }

    /// Release the backend; later `decode` calls fail
    pub fn dispose(&mut self) {
        self.slot = Slot::Disposed;
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("config", &self.config)
            .field("ready", &self.is_ready())
            .finish()
    }
}
