//! # sockrpc-transport
//!
//! TCP transport for sockrpc.
//!
//! This crate provides:
//! - `Connection`: one socket, its receive buffer and read loop
//! - `Listener`: a bound socket with a background accept loop

pub mod connection;
pub mod error;
pub mod listener;

pub use connection::{
    Connection, ConnectionId, DisconnectReason, CLOSE_GRACE_PERIOD, DEFAULT_READ_BUFFER_SIZE,
};
pub use error::TransportError;
pub use listener::Listener;
