//! # rvoice-session-core
//!
//! Peer session management for rvoice: the offer/answer state machine, the
//! registry of live sessions, per-session media channels and the manager that
//! ties them to a transport and a signaling channel.
//!
//! ## Overview
//!
//! Each remote peer gets one [`PeerSession`]. The local endpoint is either
//! the offerer or the answerer; descriptions and candidates travel through a
//! [`SignalingBridge`] as compact JSON, and the peer connection itself sits
//! behind the [`PeerTransport`] seam. Once a session reaches
//! [`SessionState::Connected`] its [`MediaChannel`] starts encoding captured
//! frames with Opus and sending them as RTP over the audio track.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rvoice_codec_core::AudioFrame;
//! use rvoice_session_core::{
//!     ChannelSignaling, ConfigHandle, LoopbackNetwork, ManagerConfig, PeerId, SessionManager,
//! };
//!
//! # async fn example() -> rvoice_session_core::Result<()> {
//! let network = LoopbackNetwork::new();
//! let (signaling, _outbox) = ChannelSignaling::new("alice");
//! let manager = SessionManager::new(
//!     ConfigHandle::default(),
//!     network.factory("alice"),
//!     Arc::new(signaling),
//!     Arc::new(|_frame: &AudioFrame| {}),
//!     ManagerConfig::default(),
//! );
//!
//! manager.config().set_is_offerer(true);
//! manager.add_peer("bob").await?;
//! manager.create_offer(&PeerId::from("bob")).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod errors;
pub mod events;
pub mod loopback;
pub mod manager;
pub mod media;
pub mod registry;
pub mod sdp;
pub mod session;
pub mod signaling;
pub mod transport;
pub mod types;

pub use config::{ConfigChange, ConfigHandle, SessionConfig};
pub use errors::{NegotiationError, Result, SessionError, SignalingError, TransportError};
pub use events::SessionEvent;
pub use loopback::{LoopbackFactory, LoopbackNetwork};
pub use manager::{ManagerConfig, SessionManager, DEFAULT_INBOUND_QUEUE_DEPTH};
pub use media::{InboundFrame, MediaChannel, MediaStats};
pub use registry::{RegistryStats, SessionRegistry};
pub use session::{PeerSession, SessionOutput};
pub use signaling::{ChannelSignaling, SignalEnvelope, SignalMessage, SignalingBridge};
pub use transport::{
    AudioTrack, PeerTransport, TransportEvent, TransportEventReceiver, TransportEventSender,
    TransportFactory, TransportSettings, TransportState,
};
pub use types::{IceCandidate, PeerId, Role, SdpType, SessionDescription, SessionState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
