//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via FRAMECAST_CONFIG)
//! 3. Environment variables

use crate::server::ServerConfig;
use framecast_protocol::{Framing, DEFAULT_MAX_PACKET_SIZE};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port the chat relay listens on.
pub const DEFAULT_PORT: u16 = 20000;

/// Largest accepted `protocol.max_packet_size` (16 MiB).
pub const MAX_PACKET_SIZE_LIMIT: usize = 16 * 1024 * 1024;

/// Largest accepted `network.idle_timeout_secs` (30 days).
pub const MAX_IDLE_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

/// Server configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Wire protocol configuration.
    pub protocol: ProtocolConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("FRAMECAST_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.network.apply_overrides(&lookup);
        self.protocol.apply_overrides(&lookup);
    }

    /// Checks values that would otherwise fail at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.max_packet_size == 0 {
            return Err(ConfigError::ValidationError(
                "protocol.max_packet_size must be positive".to_string(),
            ));
        }
        if self.protocol.max_packet_size > MAX_PACKET_SIZE_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "protocol.max_packet_size must be at most {} bytes",
                MAX_PACKET_SIZE_LIMIT
            )));
        }
        if self.network.idle_timeout_secs > MAX_IDLE_TIMEOUT_SECS {
            return Err(ConfigError::ValidationError(format!(
                "network.idle_timeout_secs must be at most {}",
                MAX_IDLE_TIMEOUT_SECS
            )));
        }
        if self.network.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "network.max_connections must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Builds the runtime session manager configuration.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.protocol.max_packet_size)
            .with_bind_ip(self.network.bind_ip)
            .with_idle_timeout(self.network.idle_timeout())
            .with_max_connections(self.network.max_connections)
            .with_framing(self.protocol.framing)
    }
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    pub bind_ip: IpAddr,
    /// Port to listen on.
    pub port: u16,
    /// Idle connection timeout in seconds (0 = never time out).
    pub idle_timeout_secs: u64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            idle_timeout_secs: 300,
            max_connections: 1000,
        }
    }
}

impl NetworkConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(ip) = lookup("FRAMECAST_BIND_IP") {
            if let Ok(parsed) = ip.parse() {
                self.bind_ip = parsed;
            }
        }

        if let Some(port) = lookup("FRAMECAST_PORT") {
            if let Ok(parsed) = port.parse() {
                self.port = parsed;
            }
        }

        if let Some(timeout) = lookup("FRAMECAST_IDLE_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.idle_timeout_secs = secs;
            }
        }

        if let Some(max) = lookup("FRAMECAST_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
    }

    /// Returns idle timeout as Duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Wire protocol configuration. Both peers must agree on these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Largest frame (type id + payload) in bytes.
    pub max_packet_size: usize,
    /// How frames are delimited on the stream.
    pub framing: Framing,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            framing: Framing::Unframed,
        }
    }
}

impl ProtocolConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(size) = lookup("FRAMECAST_MAX_PACKET_SIZE") {
            if let Ok(n) = size.parse() {
                self.max_packet_size = n;
            }
        }

        if let Some(framing) = lookup("FRAMECAST_FRAMING") {
            match framing.parse() {
                Ok(parsed) => self.framing = parsed,
                Err(e) => tracing::warn!("Ignoring FRAMECAST_FRAMING: {}", e),
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
