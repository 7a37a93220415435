//! Server error types.

use crate::config::ConfigError;
use crate::server::ClientId;
use framecast_protocol::{ProtocolError, TransportError};
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to listen on port {port}: {source}")]
    Listen {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("could not accept connection: {0}")]
    Accept(#[source] std::io::Error),

    #[error("invalid client ID of {0}")]
    InvalidClientId(ClientId),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ServerError {
    /// Returns true if this is the error `start` returns after `stop`.
    pub fn is_listener_closed(&self) -> bool {
        matches!(self, ServerError::Accept(e) if e.kind() == std::io::ErrorKind::ConnectionAborted)
    }

    /// Returns whether retrying the operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServerError::Listen { .. } | ServerError::Accept(_) => true,
            ServerError::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}
