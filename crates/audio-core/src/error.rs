//! Error types for audio capture and playback

use rvoice_codec_core::CodecError;
use thiserror::Error;

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

/// Errors raised by audio devices and the framing pipeline
#[derive(Error, Debug)]
pub enum AudioError {
    /// No usable device, or the device refused to open
    #[error("Audio device unavailable: {device} ({reason})")]
    DeviceUnavailable {
        /// Device name
        device: String,
        /// Why it could not be used
        reason: String,
    },

    /// Device cannot run the fixed voice format
    #[error("Audio format unsupported: {format}")]
    FormatUnsupported {
        /// Human readable format description
        format: String,
    },

    /// Operation needs a running device
    #[error("Audio device stopped: {device}")]
    DeviceStopped {
        /// Device name
        device: String,
    },

    /// A device operation failed mid-stream
    #[error("Audio device error on {device} during {operation}: {reason}")]
    DeviceError {
        /// Device name
        device: String,
        /// Operation that failed
        operation: String,
        /// Failure reason
        reason: String,
    },

    /// Frame construction or codec failure
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl AudioError {
    /// Create a device unavailable error
    pub fn unavailable(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            device: device.into(),
            reason: reason.into(),
        }
    }

    /// Create a device error
    pub fn device(
        device: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DeviceError {
            device: device.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}
