//! Connection configuration.

use framecast_protocol::{Framing, DEFAULT_MAX_PACKET_SIZE};
use std::time::Duration;

/// Default time allowed for the TCP connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Inactivity deadline on receive. Zero (the default) disables it.
    pub idle_timeout: Duration,
    /// Largest frame (type id + payload) in bytes. Must match the server.
    pub max_packet_size: usize,
    /// How frames are delimited on the stream. Must match the server.
    pub framing: Framing,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: Duration::ZERO,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            framing: Framing::Unframed,
        }
    }
}

impl ClientConfig {
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            max_packet_size,
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }
}
