//! Command execution.

use crate::Commands;
use colored::Colorize;
use sockrpc_client::{ClientError, RpcClient};

/// Executes a command and returns the formatted output.
pub async fn execute(client: &RpcClient, cmd: Commands) -> Result<String, ClientError> {
    match cmd {
        Commands::Repl => unreachable!(),

        Commands::Ping => {
            let reply = client.call_text::<&str>("ping", &[]).await?;
            Ok(reply.green().to_string())
        }

        Commands::Call { name, args } => {
            let reply = client.call_args(&name, &args).await?;
            Ok(format_reply(&reply))
        }

        Commands::Send { message } => {
            client.send(message).await?;
            Ok(format!("{}", "Sent".green()))
        }
    }
}

/// Renders a reply body: text as-is, anything else as escaped bytes.
pub fn format_reply(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => body.escape_ascii().to_string(),
    }
}

/// Splits a REPL line into a method name and its arguments.
///
/// Whitespace separates arguments; double quotes group words.
pub fn split_line(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    parts.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        parts.push(current);
    }
    parts
}
