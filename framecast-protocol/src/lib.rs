//! # framecast-protocol
//!
//! Wire protocol and connection plumbing for framecast.
//!
//! This crate provides:
//! - The [`Packet`] capability and bounded payload cursors
//! - A thread-safe registry mapping type identifiers to decoders and callbacks
//! - The frame codec (`[type id][payload]`) with optional length-prefixed framing
//! - [`Endpoint`], a TCP connection with concurrent send/receive and an
//!   inactivity deadline

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod packet;
pub mod registry;

pub use codec::{Codec, DecodedFrame};
pub use endpoint::Endpoint;
pub use error::{ProtocolError, TransportError};
pub use frame::{Framing, FrameDecoder, ENVELOPE_HEADER_SIZE};
pub use packet::{Packet, PacketId, PacketReader, PacketType, PacketWriter, RESERVED_PACKET_ID};
pub use registry::{BoxFuture, Callback, DecodeFn, Registration, Registry};

/// Default maximum frame size (type id + payload).
pub const DEFAULT_MAX_PACKET_SIZE: usize = 65535;
