//! Error handling for the codec library
//!
//! Every failure in this crate is per-frame and non-fatal to the stream:
//! callers drop the offending frame and keep going. The categories below let
//! callers decide whether retrying with the next frame can help.

#![allow(missing_docs)]

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Error type for encode/decode operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Invalid codec configuration
    #[error("Invalid codec configuration: {details}")]
    InvalidConfig { details: String },

    /// Input frame does not match the configured frame size
    #[error("Invalid frame size: expected {expected} samples, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },

    /// Invalid bitrate
    #[error("Invalid bitrate: {bitrate}bps (range: {min}-{max})")]
    InvalidBitrate { bitrate: u32, min: u32, max: u32 },

    /// Encoding operation failed
    #[error("Encoding failed: {reason}")]
    EncodingFailed { reason: String },

    /// Decoding operation failed
    #[error("Decoding failed: {reason}")]
    DecodingFailed { reason: String },

    /// Encoded payload is malformed or outside the accepted bounds
    #[error("Invalid payload data: {details}")]
    InvalidPayload { details: String },

    /// Codec initialization failed
    #[error("Codec initialization failed: {reason}")]
    InitializationFailed { reason: String },

    /// Feature not enabled
    #[error("Feature not enabled: {feature} (enable with --features {feature})")]
    FeatureNotEnabled { feature: String },

    /// External library error
    #[error("External library error: {library} - {error}")]
    ExternalLibraryError { library: String, error: String },
}

impl CodecError {
    /// Create a new invalid configuration error
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig {
            details: details.into(),
        }
    }

    /// Create a new invalid payload error
    pub fn invalid_payload(details: impl Into<String>) -> Self {
        Self::InvalidPayload {
            details: details.into(),
        }
    }

    /// Create a new encoding failed error
    pub fn encoding_failed(reason: impl Into<String>) -> Self {
        Self::EncodingFailed {
            reason: reason.into(),
        }
    }

    /// Create a new decoding failed error
    pub fn decoding_failed(reason: impl Into<String>) -> Self {
        Self::DecodingFailed {
            reason: reason.into(),
        }
    }

    /// Create a new initialization failed error
    pub fn initialization_failed(reason: impl Into<String>) -> Self {
        Self::InitializationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new feature not enabled error
    pub fn feature_not_enabled(feature: impl Into<String>) -> Self {
        Self::FeatureNotEnabled {
            feature: feature.into(),
        }
    }

    /// Check if this error is recoverable by moving on to the next frame
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidConfig { .. }
            | Self::InvalidBitrate { .. }
            | Self::FeatureNotEnabled { .. }
            | Self::InitializationFailed { .. } => false,

            Self::InvalidFrameSize { .. }
            | Self::EncodingFailed { .. }
            | Self::DecodingFailed { .. }
            | Self::InvalidPayload { .. }
            | Self::ExternalLibraryError { .. } => true,
        }
    }
}

#[cfg(feature = "opus")]
impl From<opus::Error> for CodecError {
    fn from(error: opus::Error) -> Self {
        Self::ExternalLibraryError {
            library: "libopus".to_string(),
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CodecError::invalid_config("test message");
        assert!(matches!(err, CodecError::InvalidConfig { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_recoverability() {
        assert!(CodecError::decoding_failed("corrupt").is_recoverable());
        assert!(CodecError::InvalidFrameSize { expected: 960, actual: 480 }.is_recoverable());
        assert!(!CodecError::initialization_failed("no libopus").is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = CodecError::InvalidFrameSize {
            expected: 960,
            actual: 80,
        };
        let display = format!("{}", err);
        assert!(display.contains("expected 960"));
        assert!(display.contains("got 80"));
    }
}
