// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/config.rs
// Version: 0.3.0
//
// This file defines the JSON configuration document for rigbridge, located
// in the core subdirectory: the ordered pool list and the device tree.
// Device entries are a tagged enum so loaders and hotplug scanners are
// decided when the file is parsed.
//
// Tree Location:
// - src/core/config.rs (configuration file model)
// - Depends on: serde, serde_json, thiserror

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Watchdog timeout used when a device does not set one (seconds)
pub const DEFAULT_WATCHDOG_SECS: u64 = 60;

/// Read-loop poll interval used when a device does not set one (milliseconds)
pub const DEFAULT_POLL_MS: u64 = 10;

/// Baud rate used when a device does not set one
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pools in failover order; the first one is used at start
    pub pools: Vec<PoolConfig>,

    /// Devices, device loaders and hotplug scanners
    #[serde(default)]
    pub devices: Vec<DeviceDescriptor>,

    /// Seconds between device statistics log lines (0 disables)
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

fn default_stats_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// host:port, optionally prefixed with stratum+tcp://
    pub url: String,
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
}

fn default_password() -> String {
    "x".to_string()
}

/// Wire protocol spoken by a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolKind {
    /// Newline-delimited JSON work and result messages
    #[default]
    JsonLine,
}

/// Settings shared by a single device and by every device a loader creates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Display name; defaults to the protocol name
    #[serde(default)]
    pub name: Option<String>,

    /// Core count (manufacturer specific)
    #[serde(default = "default_cores")]
    pub cores: u32,

    /// Seconds without a valid nonce before work is re-requested
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Milliseconds between read-loop polls
    #[serde(default)]
    pub poll: Option<u64>,

    #[serde(default)]
    pub baud: Option<u32>,

    #[serde(default)]
    pub protocol: ProtocolKind,

    /// Theoretical hashes per second of one core
    #[serde(default)]
    pub core_hash_rate: u64,
}

fn default_cores() -> u32 {
    1
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            name: None,
            cores: default_cores(),
            timeout: None,
            poll: None,
            baud: None,
            protocol: ProtocolKind::default(),
            core_hash_rate: 0,
        }
    }
}

impl DeviceSettings {
    /// Watchdog timeout; unset or zero means the 60 second default
    pub fn watchdog_timeout(&self) -> Duration {
        match self.timeout {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => Duration::from_secs(DEFAULT_WATCHDOG_SECS),
        }
    }

    /// Poll interval; unset or zero means the 10 ms default
    pub fn poll_interval(&self) -> Duration {
        match self.poll {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => Duration::from_millis(DEFAULT_POLL_MS),
        }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud.filter(|b| *b > 0).unwrap_or(DEFAULT_BAUD_RATE)
    }
}

/// One entry of the device tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceDescriptor {
    /// A single device on a known port
    Serial {
        port: String,
        #[serde(flatten)]
        settings: DeviceSettings,
    },

    /// One device per listed port, all with the same settings
    SerialLoader {
        ports: Vec<String>,
        #[serde(flatten)]
        settings: DeviceSettings,
    },

    /// A nested list of entries, resolved when the group is loaded
    Group { devices: Vec<DeviceDescriptor> },

    /// Periodically scans for ports starting with `prefix`
    SerialHotplug {
        prefix: String,
        #[serde(default = "default_scan_interval")]
        scan_interval: u64,
        #[serde(default)]
        exclude: Vec<String>,
        #[serde(flatten)]
        settings: DeviceSettings,
    },
}

fn default_scan_interval() -> u64 {
    5
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for pool in &self.pools {
            if pool.url.trim().is_empty() {
                return Err(ConfigError::Invalid("pool url must not be empty".to_string()));
            }
            if pool.user.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("pool {} has no user", pool.url)));
            }
        }
        validate_devices(&self.devices)
    }

    /// Append `.worker` to every pool user that does not carry one yet
    pub fn apply_worker(&mut self, worker: &str) {
        for pool in &mut self.pools {
            if !pool.user.contains('.') {
                pool.user = format!("{}.{}", pool.user, worker);
            }
        }
    }
}

fn validate_devices(devices: &[DeviceDescriptor]) -> Result<(), ConfigError> {
    for device in devices {
        match device {
            DeviceDescriptor::Serial { port, settings } => {
                if port.is_empty() {
                    return Err(ConfigError::Invalid("serial device without port".to_string()));
                }
                validate_settings(settings)?;
            }
            DeviceDescriptor::SerialLoader { ports, settings } => {
                if ports.iter().any(|p| p.is_empty()) {
                    return Err(ConfigError::Invalid("serial_loader lists an empty port".to_string()));
                }
                validate_settings(settings)?;
            }
            DeviceDescriptor::Group { devices } => validate_devices(devices)?,
            DeviceDescriptor::SerialHotplug {
                prefix, settings, ..
            } => {
                if prefix.is_empty() {
                    return Err(ConfigError::Invalid("serial_hotplug needs a prefix".to_string()));
                }
                validate_settings(settings)?;
            }
        }
    }
    Ok(())
}

fn validate_settings(settings: &DeviceSettings) -> Result<(), ConfigError> {
    if settings.cores == 0 {
        return Err(ConfigError::Invalid("cores must be at least 1".to_string()));
    }
    Ok(())
}

// Changelog:
// - v0.3.0 (2026-10-17): Added group and serial_hotplug entries.
// - v0.2.0 (2026-10-10): Device settings shared between devices and loaders.
//   - timeout/poll of zero fall back to the defaults.
// - v0.1.0 (2026-10-02): Initial pool list configuration.
