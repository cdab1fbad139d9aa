//! Configuration structures for an IO-Link port.
//!
//! Supports TOML deserialization with defaults that match the master
//! driver's buffer sizes, plus a `[simulated]` section describing the
//! in-memory master used when no hardware is attached.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Default ISDU receive buffer capacity in bytes.
pub const DEFAULT_ISDU_BUFFER_CAPACITY: usize = 1024;

/// Default process-data input buffer capacity in bytes.
pub const DEFAULT_PD_INPUT_CAPACITY: usize = 64;

/// Oldest supported major version of the master driver library.
pub const DEFAULT_MIN_DRIVER_MAJOR: u16 = 2;

/// Top-level port configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Master driver backend.
    pub driver: DriverKind,

    /// Channel selector such as `"COM3"`. `None` connects to the first
    /// available master.
    pub channel: Option<String>,

    /// Reject driver libraries with a lower major version.
    pub min_driver_major: u16,

    /// ISDU engine configuration.
    pub isdu: IsduConfig,

    /// Process-data channel configuration.
    pub process_data: ProcessDataConfig,

    /// Simulated master configuration.
    pub simulated: SimulatedConfig,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Simulated,
            channel: None,
            min_driver_major: DEFAULT_MIN_DRIVER_MAJOR,
            isdu: IsduConfig::default(),
            process_data: ProcessDataConfig::default(),
            simulated: SimulatedConfig::default(),
        }
    }
}

/// Supported master driver backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// In-memory master for testing and demos.
    #[default]
    Simulated,
}

/// ISDU engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsduConfig {
    /// Receive buffer capacity for ISDU read responses.
    pub buffer_capacity: usize,
}

impl Default for IsduConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_ISDU_BUFFER_CAPACITY,
        }
    }
}

/// Process-data channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessDataConfig {
    /// Receive buffer capacity for process-data input frames.
    pub input_capacity: usize,
}

impl Default for ProcessDataConfig {
    fn default() -> Self {
        Self {
            input_capacity: DEFAULT_PD_INPUT_CAPACITY,
        }
    }
}

/// Simulated master configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Reported driver library major version.
    pub version_major: u16,

    /// Reported driver library minor version.
    pub version_minor: u16,

    /// Channel numbers with an attached master.
    pub channels: Vec<u8>,

    /// Driver-internal deadline for ISDU responses.
    #[serde(with = "humantime_serde")]
    pub isdu_timeout: Duration,

    /// Simulated device response time for ISDU requests.
    #[serde(with = "humantime_serde")]
    pub isdu_latency: Duration,

    /// Process-data input frame reported by the device.
    pub pd_input: Vec<u8>,

    /// Device status byte reported with the input frame.
    pub pd_status: u8,

    /// Device parameters available over ISDU.
    pub parameters: Vec<ParameterSeed>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            version_major: 2,
            version_minor: 1,
            channels: vec![3],
            isdu_timeout: Duration::from_millis(500),
            isdu_latency: Duration::from_millis(5),
            pd_input: vec![0; 13],
            pd_status: 0,
            parameters: vec![
                ParameterSeed::read_only(0x0010, b"IO-Link Simulator".to_vec()),
                ParameterSeed::read_only(0x0012, b"Simulated Device".to_vec()),
                ParameterSeed::read_only(0x0015, b"SIM-000001".to_vec()),
            ],
        }
    }
}

/// Initial value of one simulated device parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSeed {
    /// Parameter index.
    pub index: u16,
    /// Parameter subindex.
    #[serde(default)]
    pub subindex: u8,
    /// Initial value bytes.
    pub value: Vec<u8>,
    /// Whether ISDU writes are accepted.
    #[serde(default = "default_writable")]
    pub writable: bool,
}

fn default_writable() -> bool {
    true
}

impl ParameterSeed {
    /// A writable parameter at subindex 0.
    pub fn writable(index: u16, value: Vec<u8>) -> Self {
        Self {
            index,
            subindex: 0,
            value,
            writable: true,
        }
    }

    /// A read-only parameter at subindex 0.
    pub fn read_only(index: u16, value: Vec<u8>) -> Self {
        Self {
            index,
            subindex: 0,
            value,
            writable: false,
        }
    }
}

impl PortConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        debug!(?path, "Reading port configuration");
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
