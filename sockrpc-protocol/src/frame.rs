//! Length-prefixed frame format.
//!
//! Frame layout (24 bytes header + name + body, all integers little-endian):
//!
//! ```text
//! +------------------+-----------+-------------+------------+------------+
//! | total_frame_size | body_size | name_length |    name    |    body    |
//! |     8 bytes      |  8 bytes  |   8 bytes   | name_length| body_size  |
//! +------------------+-----------+-------------+------------+------------+
//! ```
//!
//! `total_frame_size` counts the whole frame including the header. A frame
//! with `name_length == 0` is a plain message; otherwise it is a call.

use crate::buffer::ReceiveBuffer;
use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the fixed frame header in bytes (8+8+8 = 24).
pub const FRAME_HEADER_SIZE: usize = 24;

/// Width of the leading `total_frame_size` field.
const SIZE_FIELD_LEN: usize = 8;

/// Default upper bound for an incoming frame (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 16 * 1024 * 1024;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Call name; empty for plain messages.
    pub name: String,
    /// Frame body.
    pub body: Bytes,
}

impl Frame {
    /// Creates a call frame.
    pub fn call(name: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }

    /// Creates a plain message frame (no call name).
    pub fn message(body: impl Into<Bytes>) -> Self {
        Self {
            name: String::new(),
            body: body.into(),
        }
    }

    /// Returns whether this is a plain message.
    pub fn is_message(&self) -> bool {
        self.name.is_empty()
    }

    /// Size of the encoded frame, header included.
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.name.len() + self.body.len()
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> BytesMut {
        let total = self.encoded_len();
        let mut buf = BytesMut::with_capacity(total);

        buf.put_u64_le(total as u64);
        buf.put_u64_le(self.body.len() as u64);
        buf.put_u64_le(self.name.len() as u64);
        buf.put_slice(self.name.as_bytes());
        buf.put_slice(&self.body);

        buf
    }

    /// Decodes one complete raw frame, as returned by [`extract_frame`].
    pub fn decode(raw: Bytes) -> Result<Self, ProtocolError> {
        if raw.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::InvalidFrameSize(raw.len() as u64));
        }

        let mut header = &raw[..FRAME_HEADER_SIZE];
        let total = header.get_u64_le();
        let body_len = header.get_u64_le();
        let name_len = header.get_u64_le();

        let mismatch = ProtocolError::LengthMismatch {
            total,
            name_len,
            body_len,
        };
        let expected = name_len
            .checked_add(body_len)
            .and_then(|n| n.checked_add(FRAME_HEADER_SIZE as u64));
        if expected != Some(total) || total != raw.len() as u64 {
            return Err(mismatch);
        }

        let name_end = FRAME_HEADER_SIZE + name_len as usize;
        let name = std::str::from_utf8(&raw[FRAME_HEADER_SIZE..name_end])
            .map_err(|_| ProtocolError::InvalidUtf8("frame name"))?
            .to_string();
        let body = raw.slice(name_end..);

        Ok(Self { name, body })
    }
}

/// Pulls one complete raw frame out of the receive buffer.
///
/// Returns `Ok(None)` when the buffer does not yet hold a full frame; the
/// buffer is left untouched in that case. Must be called repeatedly after
/// every read, since one read can carry several frames.
pub fn extract_frame(
    buffer: &mut ReceiveBuffer,
    max_frame_size: u64,
) -> Result<Option<Bytes>, ProtocolError> {
    let mut size_field = match buffer.peek(SIZE_FIELD_LEN) {
        Ok(field) => field,
        Err(e) if e.is_overflow() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let total = size_field.get_u64_le();

    if total < FRAME_HEADER_SIZE as u64 {
        return Err(ProtocolError::InvalidFrameSize(total));
    }
    if total > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: total,
            max: max_frame_size,
        });
    }
    let total = usize::try_from(total).map_err(|_| ProtocolError::FrameTooLarge {
        size: total,
        max: max_frame_size,
    })?;

    match buffer.read_bytes(total) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.is_overflow() => Ok(None),
        Err(e) => Err(e.into()),
    }
}
