//! Error types for the session layer
//!
//! Negotiation and transport failures are returned to the caller and leave
//! the session where it was. Per-frame media failures never show up here:
//! the media channel logs and counts them.

use thiserror::Error;

use crate::types::{PeerId, Role, SdpType, SessionState};

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Offer/answer protocol violations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// No session is registered for the peer
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// The operation is reserved for the other role
    #[error("{operation} is not allowed for {role} session with {peer}")]
    WrongRole {
        /// Peer of the session
        peer: PeerId,
        /// Local role of the session
        role: Role,
        /// Operation attempted
        operation: &'static str,
    },

    /// Remote description of the wrong type for this role
    #[error("Expected remote {expected} from {peer}, got {actual}")]
    UnexpectedDescription {
        /// Peer of the session
        peer: PeerId,
        /// Type this role expects
        expected: SdpType,
        /// Type received
        actual: SdpType,
    },

    /// An answer was requested before the remote offer arrived
    #[error("No remote offer from {0} to answer")]
    MissingRemoteOffer(PeerId),

    /// The operation is not valid in the current state
    #[error("{operation} is not valid for {peer} in state {state}")]
    InvalidState {
        /// Peer of the session
        peer: PeerId,
        /// Current state
        state: SessionState,
        /// Operation attempted
        operation: &'static str,
    },

    /// The transport refused a description
    #[error("Transport rejected description from {peer}: {reason}")]
    Rejected {
        /// Peer of the session
        peer: PeerId,
        /// Transport message
        reason: String,
    },
}

/// Failures of the peer-connection library seam
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Peer connection could not be created
    #[error("Failed to create transport: {0}")]
    CreationFailed(String),

    /// Description could not be applied
    #[error("Invalid session description: {0}")]
    InvalidDescription(String),

    /// Candidate could not be parsed or applied
    #[error("Invalid ICE candidate: {0}")]
    InvalidCandidate(String),

    /// Track is not open for sending
    #[error("Track not open")]
    NotConnected,

    /// Transport has been closed
    #[error("Transport closed")]
    Closed,
}

/// Failures delivering messages to the signaling channel
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalingError {
    /// The channel to the remote side is gone
    #[error("Signaling channel closed")]
    ChannelClosed,

    /// A message could not be encoded or decoded
    #[error("Invalid signaling message: {0}")]
    InvalidMessage(String),
}

/// Top-level error for session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Offer/answer violation
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Signaling failure
    #[error(transparent)]
    Signaling(#[from] SignalingError),

    /// A session for the peer already exists
    #[error("Session for {0} already exists")]
    DuplicatePeer(PeerId),

    /// Configuration value rejected
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Codec failure outside the per-frame path
    #[error(transparent)]
    Codec(#[from] rvoice_codec_core::CodecError),

    /// RTP failure outside the per-packet path
    #[error(transparent)]
    Rtp(#[from] rvoice_rtp_core::Error),

    /// The manager was shut down
    #[error("Session manager is shut down")]
    ShutDown,
}

impl SessionError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Shortcut for an unknown peer
    pub fn unknown_peer(peer: &PeerId) -> Self {
        Self::Negotiation(NegotiationError::UnknownPeer(peer.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NegotiationError::UnexpectedDescription {
            peer: PeerId::from("bob"),
            expected: SdpType::Offer,
            actual: SdpType::Answer,
        };
        assert_eq!(err.to_string(), "Expected remote offer from bob, got answer");

        let err: SessionError = TransportError::NotConnected.into();
        assert_eq!(err.to_string(), "Track not open");
    }
}
