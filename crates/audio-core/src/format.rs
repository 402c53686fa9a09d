//! Device-facing audio format description

use rvoice_codec_core::{BYTES_PER_SAMPLE, CHANNELS, FRAME_DURATION_MS, SAMPLE_RATE};

/// Format a device runs at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Frame duration in milliseconds
    pub frame_duration_ms: u32,
}

impl AudioFormat {
    /// The only format the voice pipeline runs at: 48 kHz mono 16-bit, 20 ms
    pub const fn voice() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS as u16,
            bits_per_sample: (BYTES_PER_SAMPLE * 8) as u16,
            frame_duration_ms: FRAME_DURATION_MS,
        }
    }

    /// Samples per channel in one frame
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate * self.frame_duration_ms / 1000) as usize
    }

    /// Bytes in one interleaved frame
    pub fn frame_bytes(&self) -> usize {
        self.samples_per_frame() * self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Whether this is the voice format
    pub fn is_voice(&self) -> bool {
        *self == Self::voice()
    }

    /// Human readable description
    pub fn description(&self) -> String {
        format!(
            "{}Hz, {} channel(s), {}-bit, {}ms",
            self.sample_rate, self.channels, self.bits_per_sample, self.frame_duration_ms
        )
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::voice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvoice_codec_core::FRAME_BYTES;

    #[test]
    fn test_voice_format() {
        let format = AudioFormat::voice();
        assert_eq!(format.samples_per_frame(), 960);
        assert_eq!(format.frame_bytes(), FRAME_BYTES);
        assert!(format.is_voice());
        assert_eq!(format.description(), "48000Hz, 1 channel(s), 16-bit, 20ms");
    }
}
