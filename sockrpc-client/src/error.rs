//! Client error types.

use sockrpc_transport::TransportError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] sockrpc_protocol::ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("invalid reply: {0}")]
    InvalidReply(String),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotConnected => ClientError::NotConnected,
            TransportError::ConnectTimeout(_) => ClientError::Timeout,
            TransportError::Io(e) => ClientError::Io(e),
            other => ClientError::Transport(other),
        }
    }
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed => true,
            ClientError::Transport(TransportError::Connect { .. }) => true,
            _ => false,
        }
    }
}
