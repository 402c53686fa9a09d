//! Core frame types and codec configuration
//!
//! The uncompressed side of the pipeline is fixed: 48 kHz, mono, 20 ms
//! frames of 960 signed 16-bit samples. [`AudioFrame`] cannot be built with
//! any other size, so everything downstream can rely on the byte length.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};

/// Sample rate of every frame in Hz
pub const SAMPLE_RATE: u32 = 48_000;

/// Channel count of every frame
pub const CHANNELS: u8 = 1;

/// Frame duration in milliseconds
pub const FRAME_DURATION_MS: u32 = 20;

/// Samples per channel in one frame (20 ms at 48 kHz)
pub const SAMPLES_PER_FRAME: usize = 960;

/// Bytes per PCM sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Size of one raw PCM frame in bytes
pub const FRAME_BYTES: usize = SAMPLES_PER_FRAME * CHANNELS as usize * BYTES_PER_SAMPLE;

/// Upper bound for one encoded 20 ms frame.
///
/// An Opus packet carrying a single frame is one TOC byte plus at most 1275
/// bytes of frame data (RFC 6716 section 3.2.1).
pub const MAX_ENCODED_FRAME_SIZE: usize = 1276;

/// Frame sizes (per channel, at 48 kHz) accepted by [`CodecConfig`]
pub const SUPPORTED_FRAME_SIZES: &[usize] = &[120, 240, 480, 960, 1920, 2880];

/// Lowest accepted target bitrate
pub const MIN_BITRATE: u32 = 6_000;

/// Highest accepted target bitrate
pub const MAX_BITRATE: u32 = 510_000;

/// Default encoder target bitrate
pub const DEFAULT_BITRATE: u32 = 64_000;

/// One 20 ms block of mono 16-bit PCM at 48 kHz
#[derive(Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
}

impl AudioFrame {
    /// Build a frame from exactly [`SAMPLES_PER_FRAME`] samples
    pub fn from_samples(samples: Vec<i16>) -> Result<Self> {
        if samples.len() != SAMPLES_PER_FRAME * CHANNELS as usize {
            return Err(CodecError::InvalidFrameSize {
                expected: SAMPLES_PER_FRAME * CHANNELS as usize,
                actual: samples.len(),
            });
        }
        Ok(Self { samples })
    }

    /// Build a frame from exactly [`FRAME_BYTES`] little-endian PCM bytes
    pub fn from_pcm_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != FRAME_BYTES {
            return Err(CodecError::InvalidFrameSize {
                expected: SAMPLES_PER_FRAME * CHANNELS as usize,
                actual: bytes.len() / BYTES_PER_SAMPLE,
            });
        }
        Ok(Self {
            samples: pcm_to_samples(bytes),
        })
    }

    /// Build a frame from a short PCM block, padding the tail with silence.
    ///
    /// Used when a capture stop flushes residue. Input longer than one frame
    /// is truncated to [`FRAME_BYTES`]; an odd trailing byte is dropped.
    pub fn from_padded_pcm(bytes: &[u8]) -> Self {
        let usable = bytes.len().min(FRAME_BYTES) & !1;
        let mut samples = pcm_to_samples(&bytes[..usable]);
        samples.resize(SAMPLES_PER_FRAME * CHANNELS as usize, 0);
        Self { samples }
    }

    /// A frame of digital silence
    pub fn silence() -> Self {
        Self {
            samples: vec![0; SAMPLES_PER_FRAME * CHANNELS as usize],
        }
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Samples per channel (always [`SAMPLES_PER_FRAME`])
    pub fn sample_count(&self) -> usize {
        self.samples.len() / CHANNELS as usize
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    /// Channel count
    pub fn channels(&self) -> u8 {
        CHANNELS
    }

    /// Payload length in bytes (always [`FRAME_BYTES`])
    pub fn byte_len(&self) -> usize {
        self.samples.len() * BYTES_PER_SAMPLE
    }

    /// Serialize the samples as little-endian PCM
    pub fn to_pcm_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.byte_len());
        for sample in &self.samples {
            buf.put_i16_le(*sample);
        }
        buf.freeze()
    }

    /// Root-mean-square level, handy for checking that audio made it through
    pub fn rms(&self) -> f64 {
        let sum: f64 = self.samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt()
    }
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("samples", &self.samples.len())
            .field("sample_rate", &SAMPLE_RATE)
            .field("channels", &CHANNELS)
            .finish()
    }
}

fn pcm_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Compressed payload for one [`AudioFrame`]'s duration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    data: Bytes,
}

impl EncodedFrame {
    /// Wrap an encoded payload, checking it against [`MAX_ENCODED_FRAME_SIZE`]
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(CodecError::invalid_payload("encoded frame is empty"));
        }
        if data.len() > MAX_ENCODED_FRAME_SIZE {
            return Err(CodecError::invalid_payload(format!(
                "encoded frame of {} bytes exceeds the {} byte bound",
                data.len(),
                MAX_ENCODED_FRAME_SIZE
            )));
        }
        Ok(Self { data })
    }

    /// Payload bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Consume the frame, returning the payload
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl AsRef<[u8]> for EncodedFrame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Opus application mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpusApplication {
    /// Voice over IP (speech intelligibility)
    #[default]
    Voip,
    /// General audio (music fidelity)
    Audio,
    /// Lowest algorithmic delay
    LowDelay,
}

/// Which codec implementation backs an encoder/decoder pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecBackend {
    /// libopus through the `opus` crate
    Opus,
    /// Built-in deterministic simulation (µ-law companding)
    OpusSim,
}

impl CodecBackend {
    /// Best backend compiled into this build
    pub fn preferred() -> Option<Self> {
        if cfg!(feature = "opus") {
            Some(Self::Opus)
        } else if cfg!(feature = "opus-sim") {
            Some(Self::OpusSim)
        } else {
            None
        }
    }

    /// Name used in logs and SDP (`opus` for both backends)
    pub fn name(self) -> &'static str {
        match self {
            Self::Opus => "opus",
            Self::OpusSim => "opus-sim",
        }
    }
}

/// Encoder/decoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u8,
    /// Samples per channel in one frame
    pub frame_size: usize,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Opus application mode
    pub application: OpusApplication,
    /// Backend override; `None` picks [`CodecBackend::preferred`]
    pub backend: Option<CodecBackend>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            frame_size: SAMPLES_PER_FRAME,
            bitrate: DEFAULT_BITRATE,
            application: OpusApplication::Voip,
            backend: None,
        }
    }
}

impl CodecConfig {
    /// Voice defaults: 48 kHz mono, 20 ms, 64 kbit/s
    pub fn voice() -> Self {
        Self::default()
    }

    /// Set bitrate
    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Set frame size in samples per channel
    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size;
        self
    }

    /// Force a specific backend
    pub fn with_backend(mut self, backend: CodecBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the Opus application mode
    pub fn with_application(mut self, application: OpusApplication) -> Self {
        self.application = application;
        self
    }

    /// Samples (all channels) in one configured frame
    pub fn samples_per_frame(&self) -> usize {
        self.frame_size * self.channels as usize
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate != SAMPLE_RATE {
            return Err(CodecError::invalid_config(format!(
                "sample rate {}Hz not supported, expected {}Hz",
                self.sample_rate, SAMPLE_RATE
            )));
        }
        if self.channels != CHANNELS {
            return Err(CodecError::invalid_config(format!(
                "{} channels not supported, expected mono",
                self.channels
            )));
        }
        if !SUPPORTED_FRAME_SIZES.contains(&self.frame_size) {
            return Err(CodecError::invalid_config(format!(
                "frame size {} not one of {:?}",
                self.frame_size, SUPPORTED_FRAME_SIZES
            )));
        }
        validate_bitrate(self.bitrate)
    }
}

/// Check a bitrate against the Opus range
pub fn validate_bitrate(bitrate: u32) -> Result<()> {
    if !(MIN_BITRATE..=MAX_BITRATE).contains(&bitrate) {
        return Err(CodecError::InvalidBitrate {
            bitrate,
            min: MIN_BITRATE,
            max: MAX_BITRATE,
        });
    }
    Ok(())
}

/// Static description of a codec instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecInfo {
    /// Codec name
    pub name: &'static str,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u8,
    /// Current target bitrate
    pub bitrate: u32,
    /// Frame size in samples per channel
    pub frame_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(FRAME_BYTES, 1920);
        assert_eq!(SAMPLES_PER_FRAME as u32, SAMPLE_RATE * FRAME_DURATION_MS / 1000);
    }

    #[test]
    fn test_audio_frame_size_invariant() {
        assert!(AudioFrame::from_samples(vec![0; 959]).is_err());
        assert!(AudioFrame::from_samples(vec![0; 961]).is_err());

        let frame = AudioFrame::from_samples(vec![7; 960]).unwrap();
        assert_eq!(frame.sample_count(), 960);
        assert_eq!(frame.byte_len(), FRAME_BYTES);
        assert_eq!(frame.to_pcm_bytes().len(), FRAME_BYTES);
    }

    #[test]
    fn test_pcm_bytes_are_little_endian() {
        let mut bytes = vec![0u8; FRAME_BYTES];
        bytes[0] = 0x34;
        bytes[1] = 0x12;
        let frame = AudioFrame::from_pcm_bytes(&bytes).unwrap();
        assert_eq!(frame.samples()[0], 0x1234);
        assert_eq!(&frame.to_pcm_bytes()[..], &bytes[..]);

        let err = AudioFrame::from_pcm_bytes(&bytes[..100]).unwrap_err();
        assert!(matches!(err, CodecError::InvalidFrameSize { actual: 50, .. }));
    }

    #[test]
    fn test_padded_frame() {
        let frame = AudioFrame::from_padded_pcm(&[0xff, 0x7f, 0x01]);
        assert_eq!(frame.sample_count(), 960);
        assert_eq!(frame.samples()[0], i16::MAX);
        assert!(frame.samples()[1..].iter().all(|s| *s == 0));
    }

    #[test]
    fn test_encoded_frame_bounds() {
        assert!(EncodedFrame::new(Vec::<u8>::new()).is_err());
        assert!(EncodedFrame::new(vec![0u8; MAX_ENCODED_FRAME_SIZE + 1]).is_err());
        assert_eq!(EncodedFrame::new(vec![1u8; 10]).unwrap().len(), 10);
    }

    #[test]
    fn test_config_validation() {
        assert!(CodecConfig::voice().validate().is_ok());
        assert!(CodecConfig::voice().with_frame_size(500).validate().is_err());
        assert!(matches!(
            CodecConfig::voice().with_bitrate(1_000).validate(),
            Err(CodecError::InvalidBitrate { .. })
        ));
        let stereo = CodecConfig {
            channels: 2,
            ..CodecConfig::voice()
        };
        assert!(stereo.validate().is_err());
    }
}
