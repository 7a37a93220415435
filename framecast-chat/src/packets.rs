//! Chat packet definitions.
//!
//! Every string field is a 2-byte little-endian length followed by the raw
//! bytes. Identifier 0 is left unassigned.

use framecast_protocol::{Packet, PacketId, PacketReader, PacketType, PacketWriter, ProtocolError};

pub const MESSAGE_PACKET_ID: PacketId = 1;
pub const CONNECT_REQUEST_PACKET_ID: PacketId = 2;
pub const CONNECT_RESPONSE_PACKET_ID: PacketId = 3;
pub const CONNECTED_PACKET_ID: PacketId = 4;
pub const DISCONNECTED_PACKET_ID: PacketId = 5;
pub const PING_PACKET_ID: PacketId = 6;
pub const PONG_PACKET_ID: PacketId = 7;

/// Declares a packet whose payload is a single string field.
macro_rules! string_packet {
    ($(#[$meta:meta])* $name:ident { $field:ident } = $id:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Default)]
        pub struct $name {
            pub $field: String,
        }

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self {
                    $field: value.into(),
                }
            }
        }

        impl Packet for $name {
            fn id(&self) -> PacketId {
                Self::ID
            }

            fn encode(&self, writer: &mut PacketWriter) -> Result<(), ProtocolError> {
                writer.put_str(&self.$field)
            }
        }

        impl PacketType for $name {
            const ID: PacketId = $id;

            fn decode(reader: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
                Ok(Self {
                    $field: reader.get_string()?,
                })
            }
        }
    };
}

/// Declares a packet with an empty payload.
macro_rules! empty_packet {
    ($(#[$meta:meta])* $name:ident = $id:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name;

        impl Packet for $name {
            fn id(&self) -> PacketId {
                Self::ID
            }

            fn encode(&self, _writer: &mut PacketWriter) -> Result<(), ProtocolError> {
                Ok(())
            }
        }

        impl PacketType for $name {
            const ID: PacketId = $id;

            fn decode(_reader: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
                Ok(Self)
            }
        }
    };
}

string_packet!(
    /// A chat line. Clients send the bare text; the relay prefixes the
    /// sender's name before fanning it out.
    MessagePacket { message } = MESSAGE_PACKET_ID
);

string_packet!(
    /// First packet a client sends: the name it wants to join under.
    ConnectRequest { client_name } = CONNECT_REQUEST_PACKET_ID
);

string_packet!(
    /// Tells everyone else that a client joined.
    ConnectedPacket { client_name } = CONNECTED_PACKET_ID
);

string_packet!(
    /// Tells everyone else that a client left.
    DisconnectedPacket { client_name } = DISCONNECTED_PACKET_ID
);

empty_packet!(PingPacket = PING_PACKET_ID);
empty_packet!(PongPacket = PONG_PACKET_ID);

/// The relay's answer to a [`ConnectRequest`].
///
/// Layout: one flag byte (`1` accepted, `0` rejected); a rejection is
/// followed by the reason string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub connected: bool,
    pub error_message: String,
}

impl ConnectResponse {
    pub fn accepted() -> Self {
        Self {
            connected: true,
            error_message: String::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            connected: false,
            error_message: reason.into(),
        }
    }
}

impl Packet for ConnectResponse {
    fn id(&self) -> PacketId {
        Self::ID
    }

    fn encode(&self, writer: &mut PacketWriter) -> Result<(), ProtocolError> {
        writer.put_bool(self.connected)?;
        if !self.connected {
            writer.put_str(&self.error_message)?;
        }
        Ok(())
    }
}

impl PacketType for ConnectResponse {
    const ID: PacketId = CONNECT_RESPONSE_PACKET_ID;

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
        if reader.get_bool()? {
            return Ok(Self::accepted());
        }
        Ok(Self::rejected(reader.get_string()?))
    }
}
