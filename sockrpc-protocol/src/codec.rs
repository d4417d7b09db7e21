//! Encoder and decoder for sockrpc frames.

use crate::buffer::ReceiveBuffer;
use crate::error::ProtocolError;
use crate::frame::{extract_frame, Frame, DEFAULT_MAX_FRAME_SIZE};
use crate::tag::{reply_name, tagged_call_name};
use bytes::{Bytes, BytesMut};

/// Encodes calls, replies and plain messages into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes an untagged call.
    pub fn encode_call(name: &str, body: impl Into<Bytes>) -> BytesMut {
        Frame::call(name, body).encode()
    }

    /// Encodes a call carrying a request id.
    pub fn encode_tagged_call(id: u64, name: &str, body: impl Into<Bytes>) -> BytesMut {
        Frame::call(tagged_call_name(id, name), body).encode()
    }

    /// Encodes a plain message (`name_length == 0`).
    pub fn encode_message(body: impl Into<Bytes>) -> BytesMut {
        Frame::message(body).encode()
    }

    /// Encodes a reply: tagged when `tag` is set, a plain message otherwise.
    pub fn encode_reply(tag: Option<u64>, body: impl Into<Bytes>) -> BytesMut {
        match tag {
            Some(id) => Frame::call(reply_name(id), body).encode(),
            None => Frame::message(body).encode(),
        }
    }
}

/// Pulls decoded frames out of a receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    max_frame_size: u64,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: u64) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> u64 {
        self.max_frame_size
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&self, buffer: &mut ReceiveBuffer) -> Result<Option<Frame>, ProtocolError> {
        match extract_frame(buffer, self.max_frame_size)? {
            Some(raw) => Frame::decode(raw).map(Some),
            None => Ok(None),
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
