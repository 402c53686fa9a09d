//! Error types for the voice engine

use thiserror::Error;

use rvoice_audio_core::AudioError;
use rvoice_session_core::SessionError;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, VoiceError>;

/// Errors surfaced by [`crate::VoiceEngine`] and its configuration
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Logging could not be set up
    #[error("Logging error: {0}")]
    Logging(String),

    /// Capture is already running
    #[error("Capture already running")]
    AlreadyRunning,

    /// Capture is not running
    #[error("Capture not running")]
    NotRunning,

    /// Audio device failure
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Session failure
    #[error(transparent)]
    Session(#[from] SessionError),

    /// File access failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<serde_yaml::Error> for VoiceError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(format!("invalid YAML: {}", err))
    }
}

impl From<serde_json::Error> for VoiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("invalid JSON: {}", err))
    }
}
