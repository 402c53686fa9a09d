//! RTP error type

use thiserror::Error;

/// Error type for RTP operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Packet is shorter than the data its header announces
    #[error("Malformed RTP packet: need {required} bytes but have {available}")]
    MalformedPacket {
        /// Bytes needed to continue parsing
        required: usize,
        /// Bytes actually present
        available: usize,
    },

    /// Header fields are not valid RTP
    #[error("Invalid RTP packet format: {0}")]
    InvalidPacket(String),

    /// Payload is empty or exceeds the encoded frame bound
    #[error("Invalid RTP payload: {0}")]
    InvalidPayload(String),

    /// Invalid parameter for RTP operation
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The packetizer was disposed with its session
    #[error("Packetizer closed")]
    Closed,
}

impl Error {
    /// Whether this error describes a bad packet from the wire, as opposed to
    /// a local misuse
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedPacket { .. } | Self::InvalidPacket(_) | Self::InvalidPayload(_)
        )
    }
}
