//! Client error types.

use framecast_protocol::{ProtocolError, TransportError};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(e) => e.is_retryable(),
            ClientError::Protocol(_) => false,
        }
    }

    /// Returns true if the server closed the connection or it was closed locally.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ClientError::Transport(e) if e.is_disconnect())
    }

    /// Returns true if the connection sat idle past its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Transport(e) if e.is_timeout())
    }
}
