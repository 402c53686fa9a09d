//! Session configuration and change notifications
//!
//! [`ConfigHandle`] holds the current [`SessionConfig`] as an atomically
//! swapped snapshot and broadcasts a [`ConfigChange`] for every update,
//! resets included. Running media channels subscribe and apply bitrate,
//! payload type and SSRC changes without a restart; role and ICE servers only
//! affect sessions created afterwards.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::{Result, SessionError};
use crate::types::Role;

/// Default encoder bitrate in bits per second
pub const DEFAULT_BITRATE: u32 = rvoice_codec_core::DEFAULT_BITRATE;

/// Default RTP payload type for Opus
pub const DEFAULT_PAYLOAD_TYPE: u8 = rvoice_rtp_core::DEFAULT_PAYLOAD_TYPE;

/// Default RTP SSRC
pub const DEFAULT_SSRC: u32 = rvoice_rtp_core::DEFAULT_SSRC;

/// Default STUN server
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Per-endpoint session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Encoder target bitrate
    pub bitrate: u32,
    /// RTP payload type
    pub payload_type: u8,
    /// RTP SSRC
    pub ssrc: u32,
    /// Offer/answer role
    pub role: Role,
    /// STUN/TURN server URLs handed to the transport
    pub ice_servers: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            ssrc: DEFAULT_SSRC,
            role: Role::Answerer,
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }
}

impl SessionConfig {
    /// Check every field
    pub fn validate(&self) -> Result<()> {
        validate_bitrate(self.bitrate)?;
        validate_payload_type(self.payload_type)?;
        for server in &self.ice_servers {
            validate_ice_server(server)?;
        }
        Ok(())
    }
}

fn validate_bitrate(bitrate: u32) -> Result<()> {
    rvoice_codec_core::types::validate_bitrate(bitrate).map_err(SessionError::from)
}

fn validate_payload_type(payload_type: u8) -> Result<()> {
    if payload_type > 127 {
        return Err(SessionError::config(format!(
            "payload type {} does not fit in 7 bits",
            payload_type
        )));
    }
    Ok(())
}

fn validate_ice_server(url: &str) -> Result<()> {
    let valid = ["stun:", "stuns:", "turn:", "turns:"]
        .iter()
        .any(|scheme| url.starts_with(scheme) && url.len() > scheme.len());
    if !valid {
        return Err(SessionError::config(format!("invalid ICE server URL '{}'", url)));
    }
    Ok(())
}

/// A single configuration update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    /// New encoder bitrate
    Bitrate(u32),
    /// New RTP payload type
    PayloadType(u8),
    /// New RTP SSRC
    Ssrc(u32),
    /// New role for sessions created from now on
    Role(Role),
    /// New ICE servers for sessions created from now on
    IceServers(Vec<String>),
}

/// Shared, observable session configuration
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<ArcSwap<SessionConfig>>,
    changes: broadcast::Sender<ConfigChange>,
}

impl ConfigHandle {
    /// Wrap a validated configuration
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
            changes,
        })
    }

    /// Current configuration snapshot
    pub fn snapshot(&self) -> Arc<SessionConfig> {
        self.current.load_full()
    }

    /// Receive every subsequent change
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }

    fn update(&self, apply: impl Fn(&mut SessionConfig), change: ConfigChange) {
        self.current.rcu(|config| {
            let mut next = SessionConfig::clone(config);
            apply(&mut next);
            next
        });
        tracing::debug!("Configuration changed: {:?}", change);
        // no subscribers is fine
        let _ = self.changes.send(change);
    }

    /// Set the encoder bitrate
    pub fn set_bitrate(&self, bitrate: u32) -> Result<()> {
        validate_bitrate(bitrate)?;
        self.update(|c| c.bitrate = bitrate, ConfigChange::Bitrate(bitrate));
        Ok(())
    }

    /// Restore the default bitrate
    pub fn reset_bitrate(&self) {
        self.update(
            |c| c.bitrate = DEFAULT_BITRATE,
            ConfigChange::Bitrate(DEFAULT_BITRATE),
        );
    }

    /// Set the RTP payload type
    pub fn set_payload_type(&self, payload_type: u8) -> Result<()> {
        validate_payload_type(payload_type)?;
        self.update(
            |c| c.payload_type = payload_type,
            ConfigChange::PayloadType(payload_type),
        );
        Ok(())
    }

    /// Restore the default payload type
    pub fn reset_payload_type(&self) {
        self.update(
            |c| c.payload_type = DEFAULT_PAYLOAD_TYPE,
            ConfigChange::PayloadType(DEFAULT_PAYLOAD_TYPE),
        );
    }

    /// Set the RTP SSRC
    pub fn set_ssrc(&self, ssrc: u32) {
        self.update(|c| c.ssrc = ssrc, ConfigChange::Ssrc(ssrc));
    }

    /// Restore the default SSRC
    pub fn reset_ssrc(&self) {
        self.update(|c| c.ssrc = DEFAULT_SSRC, ConfigChange::Ssrc(DEFAULT_SSRC));
    }

    /// Set the role for new sessions
    pub fn set_role(&self, role: Role) {
        self.update(|c| c.role = role, ConfigChange::Role(role));
    }

    /// Set the role from the classic `is_offerer` flag
    pub fn set_is_offerer(&self, is_offerer: bool) {
        self.set_role(Role::from_is_offerer(is_offerer));
    }

    /// Restore the default role (answerer)
    pub fn reset_role(&self) {
        self.set_role(Role::default());
    }

    /// Replace the ICE server list
    pub fn set_ice_servers(&self, servers: Vec<String>) -> Result<()> {
        for server in &servers {
            validate_ice_server(server)?;
        }
        let change = ConfigChange::IceServers(servers.clone());
        self.update(move |c| c.ice_servers = servers.clone(), change);
        Ok(())
    }

    /// Restore the default ICE server list
    pub fn reset_ice_servers(&self) {
        let servers = SessionConfig::default().ice_servers;
        let change = ConfigChange::IceServers(servers.clone());
        self.update(move |c| c.ice_servers = servers.clone(), change);
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            current: Arc::new(ArcSwap::from_pointee(SessionConfig::default())),
            changes,
        }
    }
}

impl std::fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("current", &self.snapshot())
            .finish()
    }
}
