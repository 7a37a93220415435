//! Wire framing.
//!
//! By default a frame is written as-is and the receiver treats whatever a
//! single read returns as one frame. This matches existing peers but relies
//! on the stream not splitting or coalescing writes. The length-prefixed
//! mode wraps every frame in an envelope so frames survive arbitrary
//! segmentation:
//!
//! ```text
//! +-------------+------------------------+
//! | frame_len   | frame                  |
//! | 4 bytes LE  | type id + payload      |
//! +-------------+------------------------+
//! ```

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Size of the length-prefixed envelope header.
pub const ENVELOPE_HEADER_SIZE: usize = 4;

/// How frames are delimited on the stream. Both peers must agree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// One read is one frame.
    #[default]
    Unframed,
    /// Every frame carries a 4-byte little-endian length.
    LengthPrefixed,
}

impl Framing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framing::Unframed => "unframed",
            Framing::LengthPrefixed => "length_prefixed",
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unframed" | "raw" => Ok(Framing::Unframed),
            "length_prefixed" | "length-prefixed" | "prefixed" => Ok(Framing::LengthPrefixed),
            other => Err(format!(
                "unknown framing '{}' (expected 'unframed' or 'length_prefixed')",
                other
            )),
        }
    }
}

/// Wraps a frame in a length-prefixed envelope.
pub fn encode_envelope(frame: &[u8]) -> Result<Bytes, ProtocolError> {
    let len = u32::try_from(frame.len()).map_err(|_| ProtocolError::FrameTooLarge {
        size: frame.len(),
        max: u32::MAX as usize,
    })?;
    let mut buf = BytesMut::with_capacity(ENVELOPE_HEADER_SIZE + frame.len());
    buf.put_u32_le(len);
    buf.put_slice(frame);
    Ok(buf.freeze())
}

/// Attempts to split one enveloped frame off the front of `buf`.
///
/// Returns `Ok(None)` if more data is needed. A zero length is rejected as
/// an empty frame, and a length above `max_frame_size` is rejected before
/// any of the body is buffered.
pub fn decode_envelope(
    buf: &mut BytesMut,
    max_frame_size: usize,
) -> Result<Option<Bytes>, ProtocolError> {
    if buf.len() < ENVELOPE_HEADER_SIZE {
        return Ok(None);
    }

    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len == 0 {
        return Err(ProtocolError::EmptyFrame);
    }
    if len > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }
    if buf.len() < ENVELOPE_HEADER_SIZE + len {
        return Ok(None);
    }

    buf.advance(ENVELOPE_HEADER_SIZE);
    Ok(Some(buf.split_to(len).freeze()))
}

/// Accumulates stream bytes and yields complete enveloped frames.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_frame_size,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        decode_envelope(&mut self.buffer, self.max_frame_size)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
