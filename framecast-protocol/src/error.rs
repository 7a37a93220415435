//! Codec and transport error types.

use crate::packet::PacketId;
use std::io;
use thiserror::Error;

/// Errors raised while configuring the codec, registering packet types,
/// or turning bytes into packets and back.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("maximum packet size must be positive")]
    InvalidMaxPacketSize,

    #[error("packet type {0} is already registered")]
    AlreadyRegistered(PacketId),

    #[error("packet type {0} is not registered")]
    NotRegistered(PacketId),

    #[error("received empty packet")]
    EmptyFrame,

    #[error("packet buffer full: need {needed} bytes, {remaining} left")]
    BufferTooSmall { needed: usize, remaining: usize },

    #[error("payload truncated: need {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("field too long: {len} bytes (max {max})")]
    FieldTooLong { len: usize, max: usize },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("failed to decode packet type {packet}: {message}")]
    Decode { packet: PacketId, message: String },
}

impl ProtocolError {
    /// Shorthand for a packet-specific decode failure.
    pub fn decode(packet: PacketId, message: impl Into<String>) -> Self {
        ProtocolError::Decode {
            packet,
            message: message.into(),
        }
    }
}

/// Errors raised by a connection endpoint.
///
/// Every variant maps to one of the transport outcomes a caller has to
/// tell apart: the peer went away cleanly, the connection sat idle past its
/// deadline, or the bytes on the wire could not be read or understood.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("not connected")]
    NotConnected,

    #[error("failed to send packet type {packet_id}: {source}")]
    Send {
        packet_id: PacketId,
        #[source]
        source: io::Error,
    },

    #[error("connection timed out")]
    Timeout,

    #[error("connection closed")]
    Disconnected,

    #[error("failed to receive packet: {0}")]
    Receive(#[source] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// Returns true if the peer closed the connection or it was closed locally.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::Disconnected)
    }

    /// Returns true if the connection hit its inactivity deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }

    /// Returns true if a fresh connection attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Connect { .. }
                | TransportError::Timeout
                | TransportError::Disconnected
                | TransportError::NotConnected
        )
    }

    pub(crate) fn malformed(err: ProtocolError) -> Self {
        TransportError::Receive(io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::NotRegistered(117);
        assert!(err.to_string().contains("117"));

        let err = ProtocolError::AlreadyRegistered(3);
        assert!(err.to_string().contains("already registered"));

        let err = ProtocolError::EmptyFrame;
        assert_eq!(err.to_string(), "received empty packet");

        let err = ProtocolError::BufferTooSmall {
            needed: 9,
            remaining: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains('9') && msg.contains('4'));

        let err = ProtocolError::decode(2, "name missing");
        assert!(err.to_string().contains("name missing"));
    }

    #[test]
    fn test_transport_error_classification() {
        assert!(TransportError::Disconnected.is_disconnect());
        assert!(!TransportError::Timeout.is_disconnect());
        assert!(TransportError::Timeout.is_timeout());

        let err = TransportError::Receive(io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(!err.is_disconnect());
        assert!(!err.is_timeout());
        assert!(!err.is_retryable());

        let err: TransportError = ProtocolError::NotRegistered(1).into();
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::NotRegistered(1))
        ));
    }

    #[test]
    fn test_malformed_wraps_as_receive() {
        let err = TransportError::malformed(ProtocolError::EmptyFrame);
        match err {
            TransportError::Receive(io) => {
                assert_eq!(io.kind(), io::ErrorKind::InvalidData);
                assert!(io.to_string().contains("empty packet"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
