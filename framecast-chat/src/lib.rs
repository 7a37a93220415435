//! # framecast-chat
//!
//! Packet set for the framecast chat relay.
//!
//! This crate provides:
//! - Chat messages, the join handshake and presence notifications
//! - Ping/pong keepalive packets
//! - Client name validation shared by the server and the CLI

pub mod error;
pub mod packets;

pub use error::{validate_name, ChatError};
pub use packets::{
    ConnectRequest, ConnectResponse, ConnectedPacket, DisconnectedPacket, MessagePacket,
    PingPacket, PongPacket, CONNECTED_PACKET_ID, CONNECT_REQUEST_PACKET_ID,
    CONNECT_RESPONSE_PACKET_ID, DISCONNECTED_PACKET_ID, MESSAGE_PACKET_ID, PING_PACKET_ID,
    PONG_PACKET_ID,
};

/// Largest frame the chat relay and client agree on.
pub const MAX_PACKET_SIZE: usize = 65535;

/// Longest client name accepted by the relay, in bytes.
pub const MAX_NAME_LENGTH: usize = 32;

/// Port the relay listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 20000;
