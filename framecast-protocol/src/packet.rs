//! Packet capability and payload cursors.
//!
//! A frame on the wire is one type-identifier byte followed by the packet's
//! own payload. Packets write their payload through [`PacketWriter`], which
//! is bounded by the codec's maximum packet size, and read it back through
//! [`PacketReader`].

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, BytesMut};
use std::any::Any;
use std::fmt;

/// One-byte packet type identifier.
pub type PacketId = u8;

/// Identifier conventionally left unassigned by application packet sets.
pub const RESERVED_PACKET_ID: PacketId = 0;

/// Upper bound on a length-prefixed string or byte field.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Downcasting support for packet trait objects.
///
/// Implemented for every `'static` sized type; packet authors never
/// implement it by hand.
pub trait AsAny: Any + Send {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Any + Send> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Anything that can be written as a frame.
pub trait Packet: AsAny + Sync + fmt::Debug {
    /// Type identifier written as the first byte of the frame.
    fn id(&self) -> PacketId;

    /// Writes the payload (everything after the identifier byte).
    fn encode(&self, writer: &mut PacketWriter) -> Result<(), ProtocolError>;
}

/// A packet type with a fixed identifier that can rebuild itself from a
/// payload. This is what gets registered.
pub trait PacketType: Packet + Sized {
    const ID: PacketId;

    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, ProtocolError>;
}

impl dyn Packet {
    /// Returns true if the concrete packet is a `P`.
    pub fn is<P: Packet>(&self) -> bool {
        AsAny::as_any(self).is::<P>()
    }

    pub fn downcast_ref<P: Packet>(&self) -> Option<&P> {
        AsAny::as_any(self).downcast_ref::<P>()
    }

    /// Recovers the concrete packet, consuming the box.
    pub fn downcast<P: Packet>(self: Box<Self>) -> Option<Box<P>> {
        self.into_any().downcast::<P>().ok()
    }
}

/// Bounded payload writer. Every `put_*` fails with
/// [`ProtocolError::BufferTooSmall`] instead of growing past the limit.
#[derive(Debug)]
pub struct PacketWriter {
    buf: BytesMut,
    limit: usize,
}

impl PacketWriter {
    const INITIAL_CAPACITY: usize = 256;

    /// Creates a writer that accepts at most `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(limit.min(Self::INITIAL_CAPACITY)),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes that can still be written.
    pub fn remaining(&self) -> usize {
        self.limit - self.buf.len()
    }

    fn reserve(&mut self, needed: usize) -> Result<(), ProtocolError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(ProtocolError::BufferTooSmall { needed, remaining });
        }
        self.buf.reserve(needed);
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), ProtocolError> {
        self.reserve(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    /// Writes `1` for true and `0` for false.
    pub fn put_bool(&mut self, value: bool) -> Result<(), ProtocolError> {
        self.put_u8(u8::from(value))
    }

    pub fn put_u16(&mut self, value: u16) -> Result<(), ProtocolError> {
        self.reserve(2)?;
        self.buf.put_u16_le(value);
        Ok(())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<(), ProtocolError> {
        self.reserve(4)?;
        self.buf.put_u32_le(value);
        Ok(())
    }

    /// Writes raw bytes with no length prefix.
    pub fn put_slice(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.reserve(data.len())?;
        self.buf.put_slice(data);
        Ok(())
    }

    /// Writes a 2-byte little-endian length followed by the bytes.
    pub fn put_bytes(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if data.len() > MAX_FIELD_LEN {
            return Err(ProtocolError::FieldTooLong {
                len: data.len(),
                max: MAX_FIELD_LEN,
            });
        }
        self.reserve(2 + data.len())?;
        self.buf.put_u16_le(data.len() as u16);
        self.buf.put_slice(data);
        Ok(())
    }

    pub fn put_str(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.put_bytes(value.as_bytes())
    }

    /// Returns the bytes written so far.
    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}

/// Cursor over a received payload. Every `get_*` fails with
/// [`ProtocolError::Truncated`] if the payload is too short.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn need(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.len() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    /// Reads one byte; only `1` is true.
    pub fn get_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.get_u8()? == 1)
    }

    pub fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    /// Reads exactly `len` raw bytes.
    pub fn get_slice(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Reads a 2-byte little-endian length followed by that many bytes.
    pub fn get_bytes(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.get_u16()? as usize;
        self.get_slice(len)
    }

    /// Reads a length-prefixed string. Invalid UTF-8 is replaced, not rejected.
    pub fn get_string(&mut self) -> Result<String, ProtocolError> {
        let bytes = self.get_bytes()?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Consumes and returns everything left.
    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }
}
