//! # framecast-server
//!
//! TCP session manager for framecast.
//!
//! This crate provides:
//! - An accept loop that wraps every connection in a framed endpoint
//! - A concurrent connection table keyed by [`ClientId`]
//! - Per-connection receive loops that dispatch to registered packet handlers
//! - Unicast, broadcast and shutdown across all live connections
//! - YAML/environment configuration

pub mod config;
pub mod error;
pub mod server;

pub use config::{
    Config, ConfigError, NetworkConfig, ProtocolConfig, DEFAULT_PORT, MAX_IDLE_TIMEOUT_SECS,
    MAX_PACKET_SIZE_LIMIT,
};
pub use error::ServerError;
pub use server::{
    ClientContext, ClientId, ConnectedCallback, DisconnectedCallback, ServerConfig, ServerStats,
    SessionManager,
};
