//! Engine configuration
//!
//! [`VoiceConfig`] bundles the session settings with capture and logging
//! options. It loads from YAML or JSON and every field can be overridden by
//! an `RVOICE_*` environment variable:
//!
//! | Variable                      | Field                        |
//! |-------------------------------|------------------------------|
//! | `RVOICE_BITRATE`              | `session.bitrate`            |
//! | `RVOICE_PAYLOAD_TYPE`         | `session.payload_type`       |
//! | `RVOICE_SSRC`                 | `session.ssrc`               |
//! | `RVOICE_OFFERER`              | `session.role`               |
//! | `RVOICE_ICE_SERVERS`          | `session.ice_servers` (comma separated) |
//! | `RVOICE_RESIDUE`              | `residue`                    |
//! | `RVOICE_INBOUND_QUEUE_DEPTH`  | `inbound_queue_depth`        |
//! | `RVOICE_LOG_LEVEL`            | `log_level`                  |
//! | `RVOICE_LOG_JSON`             | `log_json`                   |

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use rvoice_audio_core::ResidueMode;
use rvoice_session_core::{Role, SessionConfig, DEFAULT_INBOUND_QUEUE_DEPTH};

use crate::error::{Result, VoiceError};
use crate::logging::{parse_log_level, LoggingConfig};

/// Prefix of the environment overrides
pub const ENV_PREFIX: &str = "RVOICE_";

/// What happens to a partial frame when capture stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureResidue {
    /// Drop it
    #[default]
    Discard,
    /// Zero-pad and send it
    Flush,
}

impl From<CaptureResidue> for ResidueMode {
    fn from(residue: CaptureResidue) -> Self {
        match residue {
            CaptureResidue::Discard => ResidueMode::Discard,
            CaptureResidue::Flush => ResidueMode::Flush,
        }
    }
}

impl FromStr for CaptureResidue {
    type Err = VoiceError;

    fn from_str(s: &str) -> Result<Self> {
        match ResidueMode::from_str(s).map_err(VoiceError::Config)? {
            ResidueMode::Discard => Ok(Self::Discard),
            ResidueMode::Flush => Ok(Self::Flush),
        }
    }
}

/// Everything needed to run a [`crate::VoiceEngine`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Codec, RTP and negotiation settings
    pub session: SessionConfig,
    /// Partial-frame handling at capture stop
    pub residue: CaptureResidue,
    /// Packets buffered between the network and playback
    pub inbound_queue_depth: usize,
    /// Log level name
    pub log_level: String,
    /// Emit JSON logs
    pub log_json: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            residue: CaptureResidue::Discard,
            inbound_queue_depth: DEFAULT_INBOUND_QUEUE_DEPTH,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl VoiceConfig {
    /// Parse YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a file; `.json` is read as JSON, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_yaml_str(&contents)
        }
    }

    /// Apply `RVOICE_*` variables from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(std::env::vars())
    }

    /// Apply `RVOICE_*` overrides from any key/value source
    pub fn with_overrides<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "BITRATE" => self.session.bitrate = parse_number(name, value)?,
                "PAYLOAD_TYPE" => self.session.payload_type = parse_number(name, value)?,
                "SSRC" => self.session.ssrc = parse_number(name, value)?,
                "OFFERER" => self.session.role = Role::from_is_offerer(parse_bool(name, value)?),
                "ICE_SERVERS" => {
                    self.session.ice_servers = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                }
                "RESIDUE" => self.residue = value.parse()?,
                "INBOUND_QUEUE_DEPTH" => self.inbound_queue_depth = parse_number(name, value)?,
                "LOG_LEVEL" => self.log_level = value.to_string(),
                "LOG_JSON" => self.log_json = parse_bool(name, value)?,
                _ => tracing::debug!("Ignoring unknown setting {}{}", ENV_PREFIX, name),
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Check every field
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        if self.inbound_queue_depth == 0 {
            return Err(VoiceError::config("inbound_queue_depth must be at least 1"));
        }
        parse_log_level(&self.log_level)?;
        Ok(())
    }

    /// Logging settings derived from this configuration
    pub fn logging(&self) -> Result<LoggingConfig> {
        let mut logging = LoggingConfig::new(parse_log_level(&self.log_level)?, "rvoice");
        logging.json = self.log_json;
        Ok(logging)
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| VoiceError::config(format!("{}{}: '{}' is not a valid number", ENV_PREFIX, name, value)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(VoiceError::config(format!(
            "{}{}: '{}' is not a boolean",
            ENV_PREFIX, name, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_with_defaults() {
        let config = VoiceConfig::from_yaml_str(
            "session:\n  bitrate: 32000\n  role: offerer\nresidue: flush\n",
        )
        .unwrap();
        assert_eq!(config.session.bitrate, 32000);
        assert_eq!(config.session.role, Role::Offerer);
        assert_eq!(config.session.payload_type, 111);
        assert_eq!(config.residue, CaptureResidue::Flush);
        assert_eq!(config.inbound_queue_depth, DEFAULT_INBOUND_QUEUE_DEPTH);
    }

    #[test]
    fn test_json_round_trip_shape() {
        let json = serde_json::to_string(&VoiceConfig::default()).unwrap();
        assert_eq!(VoiceConfig::from_json_str(&json).unwrap(), VoiceConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(VoiceConfig::from_yaml_str("session:\n  bitrate: 10\n").is_err());
        assert!(VoiceConfig::from_yaml_str("inbound_queue_depth: 0\n").is_err());
        assert!(VoiceConfig::from_yaml_str("log_level: chatty\n").is_err());
        assert!(VoiceConfig::from_yaml_str("residue: keep\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = VoiceConfig::default()
            .with_overrides([
                ("RVOICE_BITRATE", "48000"),
                ("RVOICE_OFFERER", "true"),
                ("RVOICE_ICE_SERVERS", "stun:a:3478, stun:b:3478"),
                ("RVOICE_RESIDUE", "Flush"),
                ("PATH", "/usr/bin"),
            ])
            .unwrap();
        assert_eq!(config.session.bitrate, 48000);
        assert!(config.session.role.is_offerer());
        assert_eq!(config.session.ice_servers, vec!["stun:a:3478", "stun:b:3478"]);
        assert_eq!(config.residue, CaptureResidue::Flush);

        assert!(VoiceConfig::default()
            .with_overrides([("RVOICE_SSRC", "lots")])
            .is_err());
        assert!(VoiceConfig::default()
            .with_overrides([("RVOICE_LOG_JSON", "maybe")])
            .is_err());
    }

    #[test]
    fn test_logging_config() {
        let config = VoiceConfig {
            log_level: "debug".into(),
            log_json: true,
            ..VoiceConfig::default()
        };
        let logging = config.logging().unwrap();
        assert_eq!(logging.level, tracing::Level::DEBUG);
        assert!(logging.json);
    }
}
