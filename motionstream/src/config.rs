/*!
Configuration management for the motionstream application.
*/

use anyhow::{Context, Result};
use motion_sdk::channels::ChannelSet;
use motion_sdk::protocol;
use motion_sdk::Service;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub ports: PortConfig,
    pub stream: StreamConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            ports: PortConfig::default(),
            stream: StreamConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Motion Service host and blocking call timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Host name or address of the Motion Service
    pub host: String,

    /// Seconds to wait for the first message
    pub wait_timeout_secs: u64,

    /// Seconds to wait for each following message
    pub read_timeout_secs: u64,

    /// Seconds to wait when sending
    pub write_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: protocol::DEFAULT_ADDRESS.to_string(),
            wait_timeout_secs: protocol::TIMEOUT_WAIT_FOR_DATA,
            read_timeout_secs: protocol::TIMEOUT_READ_DATA,
            write_timeout_secs: protocol::TIMEOUT_WRITE_DATA,
        }
    }
}

/// Service ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub preview: u16,
    pub sensor: u16,
    pub raw: u16,
    pub configurable: u16,
    pub console: u16,
}

impl PortConfig {
    pub fn port_for(&self, service: Service) -> u16 {
        match service {
            Service::Preview => self.preview,
            Service::Sensor => self.sensor,
            Service::Raw => self.raw,
            Service::Configurable => self.configurable,
        }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            preview: protocol::PORT_PREVIEW,
            sensor: protocol::PORT_SENSOR,
            raw: protocol::PORT_RAW,
            configurable: protocol::PORT_CONFIGURABLE,
            console: protocol::PORT_CONSOLE,
        }
    }
}

/// Stream command settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Service to stream when none is given on the command line
    pub service: Service,

    /// Messages buffered between the reader thread and the printer
    pub channel_capacity: usize,

    /// Stop after this many messages, 0 streams until interrupted
    pub max_samples: u64,

    /// Configurable service channels taken from the Preview service
    pub configurable_preview: Vec<String>,

    /// Configurable service channels taken from the Sensor service
    pub configurable_sensor: Vec<String>,

    /// Configurable service channels taken from the Raw service
    pub configurable_raw: Vec<String>,
}

impl StreamConfig {
    /// Channel definition sent to the Configurable service
    pub fn channel_set(&self) -> Result<ChannelSet> {
        let mut channels = ChannelSet::new();
        channels.extend(Service::Preview, &self.configurable_preview)?;
        channels.extend(Service::Sensor, &self.configurable_sensor)?;
        channels.extend(Service::Raw, &self.configurable_raw)?;
        Ok(channels)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            service: Service::Sensor,
            channel_capacity: 1000,
            max_samples: 0,
            configurable_preview: vec!["Gq".to_string()],
            configurable_sensor: vec!["a".to_string()],
            configurable_raw: Vec::new(),
        }
    }
}
