//! Peer-connection library seam
//!
//! A [`PeerTransport`] wraps one peer connection (ICE, DTLS, SRTP and the
//! audio track live behind it). Its methods return quickly; everything that
//! happens later (descriptions, candidates, state changes, received packets)
//! comes back as a [`TransportEvent`] on the channel handed to the
//! [`TransportFactory`], tagged with the peer id.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::errors::TransportError;
use crate::types::{IceCandidate, PeerId, Role, SdpType, SessionDescription};

/// Connectivity state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    /// Created
    New,
    /// Checking connectivity
    Connecting,
    /// Media path established
    Connected,
    /// Media path lost, may recover
    Disconnected,
    /// Connectivity checks failed
    Failed,
    /// Closed locally or remotely
    Closed,
}

/// Everything a transport reports asynchronously
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Local description generated (may still grow while gathering)
    LocalDescription(SessionDescription),
    /// A local candidate was gathered
    LocalCandidate(IceCandidate),
    /// Candidate gathering finished; the local description is final
    GatheringComplete,
    /// Connectivity changed
    StateChanged(TransportState),
    /// A packet arrived on the audio track
    TrackMessage(Bytes),
}

/// Sender half given to transports
pub type TransportEventSender = mpsc::UnboundedSender<(PeerId, TransportEvent)>;

/// Receiver half consumed by the session manager
pub type TransportEventReceiver = mpsc::UnboundedReceiver<(PeerId, TransportEvent)>;

/// Sending side of the negotiated audio track
pub trait AudioTrack: Send + Sync {
    /// Send one serialized RTP packet
    fn send(&self, packet: Bytes) -> Result<(), TransportError>;

    /// Whether the track is open for sending
    fn is_open(&self) -> bool;
}

/// One peer connection
pub trait PeerTransport: Send + Sync {
    /// Generate the local description of the given type and start gathering
    fn set_local_description(&self, sdp_type: SdpType) -> Result<(), TransportError>;

    /// Current local description, including gathered candidates
    fn local_description(&self) -> Option<SessionDescription>;

    /// Apply the remote description
    fn set_remote_description(&self, description: &SessionDescription)
        -> Result<(), TransportError>;

    /// Apply one remote candidate
    fn add_remote_candidate(&self, candidate: &IceCandidate) -> Result<(), TransportError>;

    /// The audio track
    fn audio_track(&self) -> Arc<dyn AudioTrack>;

    /// Close the connection; idempotent
    fn close(&self);
}

/// Parameters a transport is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    /// Local role
    pub role: Role,
    /// STUN/TURN servers
    pub ice_servers: Vec<String>,
    /// Payload type announced for Opus
    pub payload_type: u8,
    /// SSRC announced for the audio track
    pub ssrc: u32,
}

/// Creates peer connections
pub trait TransportFactory: Send + Sync {
    /// Create a transport for `peer` reporting on `events`
    fn create(
        &self,
        peer: &PeerId,
        settings: &TransportSettings,
        events: TransportEventSender,
    ) -> Result<Arc<dyn PeerTransport>, TransportError>;
}
