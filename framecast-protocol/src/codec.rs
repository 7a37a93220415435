//! Frame codec.
//!
//! Turns packets into frames (`[type id][payload]`) and frames back into
//! packets through a [`Registry`]. The framing mode only affects what goes
//! on the wire around each frame; see [`crate::frame`].

use crate::error::ProtocolError;
use crate::frame::{encode_envelope, Framing};
use crate::packet::{Packet, PacketWriter};
use crate::registry::{Registration, Registry};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// A decoded frame together with the registration that decoded it.
pub struct DecodedFrame<C> {
    pub registration: Registration<C>,
    pub packet: Box<dyn Packet>,
}

impl<C> fmt::Debug for DecodedFrame<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedFrame")
            .field("registration", &self.registration)
            .field("packet", &self.packet)
            .finish()
    }
}

/// Encodes and decodes frames for one registry and size limit.
pub struct Codec<C> {
    registry: Arc<Registry<C>>,
    max_packet_size: usize,
    framing: Framing,
}

impl<C> Clone for Codec<C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            max_packet_size: self.max_packet_size,
            framing: self.framing,
        }
    }
}

impl<C> fmt::Debug for Codec<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("registry", &self.registry)
            .field("max_packet_size", &self.max_packet_size)
            .field("framing", &self.framing)
            .finish()
    }
}

impl<C: Send + 'static> Codec<C> {
    /// Creates a codec with an empty registry.
    pub fn new(max_packet_size: usize, framing: Framing) -> Result<Self, ProtocolError> {
        Self::with_registry(Arc::new(Registry::new()), max_packet_size, framing)
    }

    /// Creates a codec over an existing registry.
    pub fn with_registry(
        registry: Arc<Registry<C>>,
        max_packet_size: usize,
        framing: Framing,
    ) -> Result<Self, ProtocolError> {
        if max_packet_size == 0 {
            return Err(ProtocolError::InvalidMaxPacketSize);
        }
        Ok(Self {
            registry,
            max_packet_size,
            framing,
        })
    }

    pub fn registry(&self) -> &Arc<Registry<C>> {
        &self.registry
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Encodes `packet` as a frame: its identifier byte, then its payload.
    ///
    /// The frame never exceeds the maximum packet size; a payload that does
    /// not fit fails with [`ProtocolError::BufferTooSmall`].
    pub fn encode(&self, packet: &dyn Packet) -> Result<Bytes, ProtocolError> {
        let mut writer = PacketWriter::with_limit(self.max_packet_size);
        writer.put_u8(packet.id())?;
        packet.encode(&mut writer)?;
        Ok(writer.into_inner().freeze())
    }

    /// Encodes `packet` as it goes on the wire, envelope included.
    pub fn encode_wire(&self, packet: &dyn Packet) -> Result<Bytes, ProtocolError> {
        let frame = self.encode(packet)?;
        match self.framing {
            Framing::Unframed => Ok(frame),
            Framing::LengthPrefixed => encode_envelope(&frame),
        }
    }

    /// Decodes a frame: looks up its identifier byte and hands the rest to
    /// the registered decoder.
    pub fn decode(&self, frame: &[u8]) -> Result<DecodedFrame<C>, ProtocolError> {
        let (&id, payload) = frame.split_first().ok_or(ProtocolError::EmptyFrame)?;
        let registration = self.registry.lookup(id)?;
        let packet = registration.decode(payload)?;
        Ok(DecodedFrame {
            registration,
            packet,
        })
    }
}
