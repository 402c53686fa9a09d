//! Signaling contract
//!
//! Descriptions travel as compact JSON `{"type":"offer"|"answer","sdp":"…"}`
//! and candidates as `{"candidate":"…","mid":"…"}`. The session layer only
//! produces and consumes [`SignalMessage`]s; moving them between endpoints
//! is the job of a [`SignalingBridge`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::SignalingError;
use crate::types::{IceCandidate, PeerId, SessionDescription};

/// Anything one endpoint tells the other during negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalMessage {
    /// Offer or answer
    Description(SessionDescription),
    /// Trickled ICE candidate
    Candidate(IceCandidate),
}

impl SignalMessage {
    /// Encode as compact JSON in the wire shape of the variant
    pub fn to_json(&self) -> Result<String, SignalingError> {
        let encoded = match self {
            Self::Description(desc) => serde_json::to_string(desc),
            Self::Candidate(candidate) => serde_json::to_string(candidate),
        };
        encoded.map_err(|e| SignalingError::InvalidMessage(e.to_string()))
    }

    /// Decode either wire shape; a `type` key marks a description
    pub fn from_json(json: &str) -> Result<Self, SignalingError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| SignalingError::InvalidMessage(e.to_string()))?;
        let is_description = value.get("type").is_some();
        let decoded = if is_description {
            SessionDescription::deserialize(value).map(Self::Description)
        } else {
            IceCandidate::deserialize(value).map(Self::Candidate)
        };
        decoded.map_err(|e| SignalingError::InvalidMessage(e.to_string()))
    }
}

impl From<SessionDescription> for SignalMessage {
    fn from(desc: SessionDescription) -> Self {
        Self::Description(desc)
    }
}

impl From<IceCandidate> for SignalMessage {
    fn from(candidate: IceCandidate) -> Self {
        Self::Candidate(candidate)
    }
}

/// Outbound half of signaling: deliver local negotiation data to a peer
#[async_trait]
pub trait SignalingBridge: Send + Sync {
    /// Send the finalised local description
    async fn send_description(
        &self,
        peer: &PeerId,
        description: &SessionDescription,
    ) -> Result<(), SignalingError>;

    /// Send one local candidate
    async fn send_candidate(
        &self,
        peer: &PeerId,
        candidate: &IceCandidate,
    ) -> Result<(), SignalingError>;
}

/// One relayed message: the peer it is addressed to and its JSON text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Addressee
    pub to: PeerId,
    /// Sender
    pub from: PeerId,
    /// JSON text as it would go over the wire
    pub payload: String,
}

impl SignalEnvelope {
    /// Decode the payload
    pub fn message(&self) -> Result<SignalMessage, SignalingError> {
        SignalMessage::from_json(&self.payload)
    }
}

/// In-process [`SignalingBridge`] that pushes JSON envelopes into a channel.
///
/// Stands in for a rendezvous server: whoever owns the receiver forwards
/// each envelope to the addressed endpoint.
#[derive(Debug, Clone)]
pub struct ChannelSignaling {
    local: PeerId,
    tx: mpsc::UnboundedSender<SignalEnvelope>,
}

impl ChannelSignaling {
    /// Create a bridge for the endpoint named `local`
    pub fn new(local: impl Into<PeerId>) -> (Self, mpsc::UnboundedReceiver<SignalEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                local: local.into(),
                tx,
            },
            rx,
        )
    }

    fn relay(&self, peer: &PeerId, message: SignalMessage) -> Result<(), SignalingError> {
        let envelope = SignalEnvelope {
            to: peer.clone(),
            from: self.local.clone(),
            payload: message.to_json()?,
        };
        tracing::trace!("Signal {} -> {}: {}", envelope.from, envelope.to, envelope.payload);
        self.tx
            .send(envelope)
            .map_err(|_| SignalingError::ChannelClosed)
    }
}

#[async_trait]
impl SignalingBridge for ChannelSignaling {
    async fn send_description(
        &self,
        peer: &PeerId,
        description: &SessionDescription,
    ) -> Result<(), SignalingError> {
        self.relay(peer, SignalMessage::Description(description.clone()))
    }

    async fn send_candidate(
        &self,
        peer: &PeerId,
        candidate: &IceCandidate,
    ) -> Result<(), SignalingError> {
        self.relay(peer, SignalMessage::Candidate(candidate.clone()))
    }
}
