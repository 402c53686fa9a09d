//! Session Event System
//!
//! Events are published on a `tokio::sync::broadcast` channel by the
//! session manager. Slow subscribers lag and lose old events; they never
//! block negotiation.

use crate::types::{IceCandidate, PeerId, Role, SessionDescription, SessionState};

/// Session events published by the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session was created and registered
    PeerAdded {
        /// Remote peer
        peer: PeerId,
        /// Local role
        role: Role,
    },

    /// Negotiation state changed
    StateChanged {
        /// Remote peer
        peer: PeerId,
        /// Previous state
        old_state: SessionState,
        /// New state
        new_state: SessionState,
    },

    /// The local description is final and was handed to signaling
    LocalDescription {
        /// Remote peer
        peer: PeerId,
        /// The description
        description: SessionDescription,
    },

    /// A local candidate was handed to signaling
    LocalCandidate {
        /// Remote peer
        peer: PeerId,
        /// The candidate
        candidate: IceCandidate,
    },

    /// Media path is up and outbound audio is flowing
    Connected {
        /// Remote peer
        peer: PeerId,
    },

    /// Media path dropped; the session is kept
    Disconnected {
        /// Remote peer
        peer: PeerId,
    },

    /// First decoded frame from this peer was rendered
    AudioReady {
        /// Remote peer
        peer: PeerId,
    },

    /// A remote candidate could not be applied
    CandidateRejected {
        /// Remote peer
        peer: PeerId,
        /// The candidate
        candidate: IceCandidate,
        /// Why it was rejected
        reason: String,
    },

    /// Something went wrong that did not end the session
    Error {
        /// Remote peer
        peer: PeerId,
        /// Description of the failure
        message: String,
    },

    /// The session was closed and removed
    Closed {
        /// Remote peer
        peer: PeerId,
    },
}

impl SessionEvent {
    /// Peer the event is about
    pub fn peer(&self) -> &PeerId {
        match self {
            Self::PeerAdded { peer, .. }
            | Self::StateChanged { peer, .. }
            | Self::LocalDescription { peer, .. }
            | Self::LocalCandidate { peer, .. }
            | Self::Connected { peer }
            | Self::Disconnected { peer }
            | Self::AudioReady { peer }
            | Self::CandidateRejected { peer, .. }
            | Self::Error { peer, .. }
            | Self::Closed { peer } => peer,
        }
    }
}
