//! Server error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] sockrpc_protocol::ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] sockrpc_transport::TransportError),

    #[error("server already running")]
    AlreadyRunning,

    #[error("server not running")]
    NotRunning,

    #[error("outbound queue full")]
    QueueFull,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ServerError {
    /// Returns whether the error came from the peer's input rather than the
    /// server itself.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, ServerError::Protocol(_) | ServerError::QueueFull)
    }
}
