//! # sockrpc-protocol
//!
//! Wire protocol implementation for sockrpc.
//!
//! This crate provides:
//! - A per-connection receive buffer with peek/consume semantics
//! - Length-prefixed binary framing (24-byte little-endian header)
//! - Comma-separated call argument parsing
//! - Request-id tags for correlating concurrent calls

pub mod args;
pub mod buffer;
pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod tag;

pub use args::{encode_args, parse_args};
pub use buffer::ReceiveBuffer;
pub use codec::{Decoder, Encoder};
pub use error::{BufferError, ProtocolError};
pub use frame::{extract_frame, Frame, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE};
pub use message::{Call, Inbound};

/// Default port for a sockrpc server.
pub const DEFAULT_PORT: u16 = 7400;
