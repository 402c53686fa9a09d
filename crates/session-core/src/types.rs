//! Identifiers and value types shared across the session layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the remote party; the registry key for its session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Which side of the offer/answer exchange this endpoint plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Creates the offer, expects an answer
    Offerer,
    /// Waits for an offer, creates the answer
    #[default]
    Answerer,
}

impl Role {
    /// Map the classic `is_offerer` flag
    pub fn from_is_offerer(is_offerer: bool) -> Self {
        if is_offerer {
            Self::Offerer
        } else {
            Self::Answerer
        }
    }

    /// Whether this is the offering side
    pub fn is_offerer(self) -> bool {
        self == Self::Offerer
    }

    /// Description type this role expects from the remote side
    pub fn expected_remote(self) -> SdpType {
        match self {
            Self::Offerer => SdpType::Answer,
            Self::Answerer => SdpType::Offer,
        }
    }

    /// Description type this role produces
    pub fn local_type(self) -> SdpType {
        match self {
            Self::Offerer => SdpType::Offer,
            Self::Answerer => SdpType::Answer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offerer => write!(f, "offerer"),
            Self::Answerer => write!(f, "answerer"),
        }
    }
}

/// Negotiation state of a peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, nothing exchanged yet
    New,
    /// Local description requested, candidates being gathered
    GatheringLocal,
    /// Descriptions in flight
    Negotiating,
    /// Both descriptions applied and the transport is up; audio flows
    Connected,
    /// Transport dropped; the session is kept
    Disconnected,
    /// Torn down; terminal
    Closed,
}

impl SessionState {
    /// Whether the state is terminal
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "New",
            Self::GatheringLocal => "GatheringLocal",
            Self::Negotiating => "Negotiating",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// SDP description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Offer
    Offer,
    /// Answer
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offer => write!(f, "offer"),
            Self::Answer => write!(f, "answer"),
        }
    }
}

/// Session description as exchanged over signaling: `{"type":…,"sdp":…}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Create a description
    pub fn new(sdp_type: SdpType, sdp: impl Into<String>) -> Self {
        Self {
            sdp_type,
            sdp: sdp.into(),
        }
    }

    /// Create an offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self::new(SdpType::Offer, sdp)
    }

    /// Create an answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self::new(SdpType::Answer, sdp)
    }
}

/// ICE candidate as exchanged over signaling: `{"candidate":…,"mid":…}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate attribute value
    pub candidate: String,
    /// Media stream identification tag
    pub mid: String,
}

impl IceCandidate {
    /// Create a candidate
    pub fn new(candidate: impl Into<String>, mid: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            mid: mid.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_expectations() {
        assert_eq!(Role::default(), Role::Answerer);
        assert_eq!(Role::from_is_offerer(true), Role::Offerer);
        assert_eq!(Role::Offerer.expected_remote(), SdpType::Answer);
        assert_eq!(Role::Answerer.expected_remote(), SdpType::Offer);
        assert_eq!(Role::Answerer.local_type(), SdpType::Answer);
    }

    #[test]
    fn test_description_json_shape() {
        let desc = SessionDescription::offer("v=0");
        let json = serde_json::to_string(&desc).unwrap();
        assert_eq!(json, r#"{"type":"offer","sdp":"v=0"}"#);

        let back: SessionDescription = serde_json::from_str(r#"{"sdp":"x","type":"answer"}"#).unwrap();
        assert_eq!(back, SessionDescription::answer("x"));
    }

    #[test]
    fn test_peer_id_display() {
        let peer = PeerId::from("bob");
        assert_eq!(peer.to_string(), "bob");
        assert_eq!(serde_json::to_string(&peer).unwrap(), r#""bob""#);
    }
}
