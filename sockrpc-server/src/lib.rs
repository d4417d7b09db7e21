//! # sockrpc-server
//!
//! RPC server for sockrpc.
//!
//! This crate provides:
//! - An accept loop with one supervised task per connection
//! - Frame decoding and call dispatch to a single event handler
//! - A session registry drained on shutdown
//! - YAML/environment configuration

pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, LimitsConfig, NetworkConfig};
pub use error::ServerError;
pub use handler::{BuiltinHandler, EventHandler};
pub use server::{FaultHook, RpcServer, ServerConfig, ServerStats};
pub use session::{Rejected, Session, SessionRegistry, DEFAULT_OUTBOUND_QUEUE_SIZE};
