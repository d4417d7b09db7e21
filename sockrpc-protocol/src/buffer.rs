//! Per-connection receive buffer.
//!
//! TCP delivers a byte stream, so a single socket read may hold zero, one or
//! several frames, or only part of one. The receive buffer accumulates the
//! bytes until the frame codec can pull a complete frame out of it.

use crate::error::BufferError;
use bytes::{Buf, Bytes, BytesMut};

/// Default initial capacity (32 KiB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 32 * 1024;

/// Append-only byte accumulator with peek/consume semantics.
///
/// Bytes `[0, len)` are valid and ordered. Consuming `n` bytes moves the
/// remaining span to the front.
#[derive(Debug)]
pub struct ReceiveBuffer {
    buf: BytesMut,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends `data` at the write cursor, growing the store if needed.
    pub fn write(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the first `n` bytes without consuming them.
    pub fn peek(&self, n: usize) -> Result<&[u8], BufferError> {
        self.check_available(n)?;
        Ok(&self.buf[..n])
    }

    /// Copies the first `n` bytes into `dest` and consumes them.
    ///
    /// On error the buffer is left unchanged.
    pub fn read(&mut self, dest: &mut [u8], n: usize) -> Result<(), BufferError> {
        self.check_available(n)?;
        if dest.len() < n {
            return Err(BufferError::Capacity {
                requested: n,
                capacity: dest.len(),
            });
        }
        dest[..n].copy_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        Ok(())
    }

    /// Consumes the first `n` bytes and returns them without copying.
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes, BufferError> {
        self.check_available(n)?;
        Ok(self.buf.split_to(n).freeze())
    }

    /// Number of valid (unconsumed) bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes that can be written without reallocating.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Discards all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    fn check_available(&self, n: usize) -> Result<(), BufferError> {
        if n > self.buf.len() {
            return Err(BufferError::Overflow {
                requested: n,
                available: self.buf.len(),
            });
        }
        Ok(())
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_peek() {
        let mut buffer = ReceiveBuffer::new();
        buffer.write(b"hello");
        buffer.write(b" world");

        assert_eq!(buffer.len(), 11);
        assert_eq!(buffer.peek(5).unwrap(), b"hello");
        // Peek does not consume
        assert_eq!(buffer.len(), 11);
    }

    #[test]
    fn test_read_consumes_and_shifts() {
        let mut buffer = ReceiveBuffer::new();
        buffer.write(b"abcdef");

        let mut dest = [0u8; 4];
        buffer.read(&mut dest, 4).unwrap();
        assert_eq!(&dest, b"abcd");
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.peek(2).unwrap(), b"ef");
    }

    #[test]
    fn test_peek_overflow_leaves_state() {
        let mut buffer = ReceiveBuffer::new();
        buffer.write(b"abc");

        let err = buffer.peek(8).unwrap_err();
        assert_eq!(
            err,
            BufferError::Overflow {
                requested: 8,
                available: 3
            }
        );
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.peek(3).unwrap(), b"abc");
    }

    #[test]
    fn test_read_overflow_leaves_state() {
        let mut buffer = ReceiveBuffer::new();
        buffer.write(b"abc");

        let mut dest = [0u8; 16];
        let err = buffer.read(&mut dest, 8).unwrap_err();
        assert!(err.is_overflow());
        assert_eq!(buffer.len(), 3);
        assert_eq!(dest, [0u8; 16]);
    }

    #[test]
    fn test_read_capacity_error() {
        let mut buffer = ReceiveBuffer::new();
        buffer.write(b"abcdef");

        let mut dest = [0u8; 2];
        let err = buffer.read(&mut dest, 4).unwrap_err();
        assert_eq!(
            err,
            BufferError::Capacity {
                requested: 4,
                capacity: 2
            }
        );
        assert_eq!(buffer.len(), 6);
    }

    #[test]
    fn test_overflow_checked_before_capacity() {
        let mut buffer = ReceiveBuffer::new();
        buffer.write(b"ab");

        let mut dest = [0u8; 1];
        assert!(buffer.read(&mut dest, 4).unwrap_err().is_overflow());
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let mut buffer = ReceiveBuffer::with_capacity(4);
        buffer.write(&[7u8; 100]);
        assert_eq!(buffer.len(), 100);
        assert!(buffer.capacity() >= 100);
    }

    #[test]
    fn test_read_bytes() {
        let mut buffer = ReceiveBuffer::new();
        buffer.write(b"frame-onerest");

        let bytes = buffer.read_bytes(9).unwrap();
        assert_eq!(bytes.as_ref(), b"frame-one");
        assert_eq!(buffer.peek(4).unwrap(), b"rest");
        assert!(buffer.read_bytes(5).unwrap_err().is_overflow());
    }

    #[test]
    fn test_zero_length_ops() {
        let mut buffer = ReceiveBuffer::default();
        assert!(buffer.is_empty());
        assert_eq!(buffer.peek(0).unwrap(), b"");
        let mut dest = [0u8; 0];
        buffer.read(&mut dest, 0).unwrap();
    }

    #[test]
    fn test_clear() {
        let mut buffer = ReceiveBuffer::new();
        buffer.write(b"xyz");
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
