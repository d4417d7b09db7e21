//! # sockrpc-client
//!
//! Client library for sockrpc.
//!
//! This crate provides:
//! - Async TCP client with a background read loop
//! - Calls that wait for their reply, with a deadline
//! - Optional request-id tagging for concurrent calls

pub mod client;
pub mod config;
pub mod error;
pub mod pending;

pub use client::RpcClient;
pub use config::{ClientConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use error::ClientError;
