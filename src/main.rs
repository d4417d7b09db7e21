//! sockrpc - framed RPC over TCP
//!
//! Runs a server answering the built-in methods (`ping`, `echo`, `time`,
//! `close`) until Ctrl+C.

use sockrpc_server::{BuiltinHandler, Config, RpcServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if SOCKRPC_CONFIG is set, then env overrides)
    let config_path = std::env::var("SOCKRPC_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(path) = &config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::warn!("Invalid environment configuration ({}), using defaults", e);
            Config::default()
        }
    };

    tracing::info!("Starting sockrpc server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);
    tracing::info!("  Read buffer: {} bytes", config.network.read_buffer_size);
    tracing::info!("  Max frame size: {} bytes", config.limits.max_frame_size);

    let server = RpcServer::new(ServerConfig::from(&config), BuiltinHandler::new())
        .with_fault_hook(|| tracing::error!("Connection handler fault"));
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping server...");
    server.stop().await?;

    let stats = server.stats();
    tracing::info!(
        "Served {} connections, {} calls",
        stats
            .connections_total
            .load(std::sync::atomic::Ordering::Relaxed),
        stats.calls_total.load(std::sync::atomic::Ordering::Relaxed)
    );
    Ok(())
}
