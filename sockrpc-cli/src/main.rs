//! sockrpc-cli - Command-line interface for sockrpc
//!
//! Provides both a REPL and one-shot call execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use sockrpc_client::{ClientConfig, RpcClient};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sockrpc-cli")]
#[command(about = "Command-line interface for sockrpc servers")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7400", env = "SOCKRPC_SERVER")]
    server: SocketAddr,

    /// Seconds to wait for a reply (0 waits forever)
    #[arg(short, long, default_value = "30")]
    timeout: u64,

    /// Tag calls with request ids
    #[arg(long)]
    tagged: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start interactive REPL
    Repl,

    /// Ping the server
    Ping,

    /// Call a method and print the reply
    Call {
        /// Method name
        name: String,

        /// Arguments (quoted on the wire when they contain commas or quotes)
        args: Vec<String>,
    },

    /// Send a plain message (no reply expected)
    Send {
        /// Message body
        message: String,
    },
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(self.server).with_tagged_calls(self.tagged);
        if self.timeout == 0 {
            config.without_request_timeout()
        } else {
            config.with_request_timeout(Duration::from_secs(self.timeout))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = RpcClient::new(cli.client_config());

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(client, cli.server).await?;
        }
        Some(cmd) => {
            client
                .connect(|| tracing::debug!("Connection closed"))
                .await
                .map_err(|e| {
                    eprintln!("{}: {}", "Connection failed".red(), e);
                    e
                })?;

            let result = commands::execute(&client, cmd).await;
            client.close();

            match result {
                Ok(output) => {
                    if !output.is_empty() {
                        println!("{}", output);
                    }
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
