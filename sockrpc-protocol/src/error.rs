//! Protocol error types.

use thiserror::Error;

/// Receive buffer access errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    /// More bytes were requested than are currently buffered. This is a
    /// retry signal: the caller should try again once more data arrives.
    #[error("buffer overflow: requested {requested} bytes, {available} available")]
    Overflow { requested: usize, available: usize },

    /// The destination slice is smaller than the requested read.
    #[error("destination too small: requested {requested} bytes, capacity {capacity}")]
    Capacity { requested: usize, capacity: usize },
}

impl BufferError {
    /// Returns whether this is the "not enough data yet" condition.
    pub fn is_overflow(&self) -> bool {
        matches!(self, BufferError::Overflow { .. })
    }
}

/// Protocol-level errors that can occur during framing or call decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u64 },

    #[error("invalid frame size: {0} bytes is smaller than the header")]
    InvalidFrameSize(u64),

    #[error(
        "frame length mismatch: total {total}, header + name {name_len} + body {body_len}"
    )]
    LengthMismatch {
        total: u64,
        name_len: u64,
        body_len: u64,
    },

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("unterminated quoted argument starting at byte {0}")]
    UnterminatedQuote(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns whether the error leaves the byte stream unusable, i.e. the
    /// connection it came from has to be closed.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::FrameTooLarge { .. }
                | ProtocolError::InvalidFrameSize(_)
                | ProtocolError::LengthMismatch { .. }
                | ProtocolError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_is_retry_signal() {
        let err = BufferError::Overflow {
            requested: 8,
            available: 3,
        };
        assert!(err.is_overflow());
        assert!(err.to_string().contains("8"));

        let err = BufferError::Capacity {
            requested: 8,
            capacity: 4,
        };
        assert!(!err.is_overflow());
    }

    #[test]
    fn test_connection_fatal() {
        assert!(ProtocolError::InvalidFrameSize(3).is_connection_fatal());
        assert!(ProtocolError::FrameTooLarge { size: 10, max: 5 }.is_connection_fatal());
        assert!(!ProtocolError::UnterminatedQuote(0).is_connection_fatal());
        assert!(!ProtocolError::InvalidUtf8("body").is_connection_fatal());
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::FrameTooLarge { size: 100, max: 50 };
        assert!(err.to_string().contains("100"));

        let err = ProtocolError::LengthMismatch {
            total: 40,
            name_len: 4,
            body_len: 4,
        };
        assert!(err.to_string().contains("40"));

        let err = ProtocolError::InvalidUtf8("name");
        assert!(err.to_string().contains("UTF-8"));
    }
}
