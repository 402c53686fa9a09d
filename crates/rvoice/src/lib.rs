//! # rvoice
//!
//! Peer-to-peer voice: microphone PCM is cut into 20 ms frames, encoded with
//! Opus, packetized as RTP and sent to every connected peer; received packets
//! are decoded and played back. Sessions are negotiated with an offer/answer
//! exchange carried by any signaling channel.
//!
//! ## Crates
//!
//! - [`rvoice_codec_core`]: frames, encoder and decoder
//! - [`rvoice_audio_core`]: frame buffering, device seam, pipelines
//! - [`rvoice_session_core`]: peer sessions, registry, media channels
//! - this crate: [`VoiceEngine`], configuration loading and logging
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rvoice::{VoiceConfig, VoiceEngine};
//! use rvoice::audio::MemoryAudioPort;
//! use rvoice::session::{ChannelSignaling, LoopbackNetwork};
//!
//! # async fn example() -> rvoice::Result<()> {
//! let network = LoopbackNetwork::new();
//! let (signaling, outbox) = ChannelSignaling::new("alice");
//! let engine = VoiceEngine::new(
//!     &VoiceConfig::default(),
//!     Arc::new(MemoryAudioPort::new("mic")),
//!     network.factory("alice"),
//!     Arc::new(signaling),
//! )?;
//!
//! engine.start()?;
//! engine.call("bob").await?;
//! // forward `outbox` to bob and bob's messages to `engine.handle_signal`
//! # drop(outbox);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;

pub use config::{CaptureResidue, VoiceConfig};
pub use engine::{EngineStats, VoiceEngine};
pub use error::{Result, VoiceError};
pub use logging::{setup_logging, LoggingConfig};

/// Codec layer
pub use rvoice_codec_core as codec;

/// Audio layer
pub use rvoice_audio_core as audio;

/// Session layer
pub use rvoice_session_core as session;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
