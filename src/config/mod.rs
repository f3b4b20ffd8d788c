//! Configuration for the FED codec tools
//!
//! Loaded from a TOML file with one table per concern:
//!
//! ```toml
//! [decode]
//! event_format = "standard"
//!
//! [encode]
//! daq_mode = "virgin_raw"
//! slink64 = false
//!
//! [simulator]
//! seed = 42
//! occupancy = 0.02
//! ```
//!
//! Every table and every field is optional.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::fed::packet::is_supported_combination;
use crate::fed::records::{SOURCE_ID_MAX, TTS_MAX};
use crate::fed::{DecodeSettings, EncodeSettings};
use crate::simulator::SimulatorConfig;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub decode: DecodeSettings,
    pub encode: EncodeSettings,
    pub simulator: SimulatorConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.encode;
        if !is_supported_combination(e.event_format, e.header_format, e.daq_mode) {
            return Err(ConfigError::InvalidValue {
                field: "encode",
                reason: format!(
                    "{:?} / {:?} / {:?} is not a supported combination",
                    e.event_format, e.header_format, e.daq_mode
                ),
            });
        }
        if let Some(code) = e.packet_code {
            if code.mode() != e.daq_mode {
                return Err(ConfigError::InvalidValue {
                    field: "encode.packet_code",
                    reason: format!("{:?} does not belong to {:?}", code, e.daq_mode),
                });
            }
        }
        if e.source_id > SOURCE_ID_MAX {
            return Err(ConfigError::InvalidValue {
                field: "encode.source_id",
                reason: format!("0x{:x} does not fit in 12 bits", e.source_id),
            });
        }
        if e.tts > TTS_MAX {
            return Err(ConfigError::InvalidValue {
                field: "encode.tts",
                reason: format!("0x{:x} does not fit in 4 bits", e.tts),
            });
        }
        if !(0.0..=1.0).contains(&self.simulator.occupancy) {
            return Err(ConfigError::InvalidValue {
                field: "simulator.occupancy",
                reason: format!("{} is outside [0, 1]", self.simulator.occupancy),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
