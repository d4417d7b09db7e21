//! Interactive REPL.

use crate::commands::{format_reply, split_line};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use sockrpc_client::RpcClient;
use std::net::SocketAddr;

const HELP_TEXT: &str = r#"
Available commands:
  help                          Show this help
  ping                          Ping the server
  send <message>                Send a plain message
  <method> [args...]            Call a method; quote arguments with spaces

  quit, exit                    Exit the REPL
"#;

pub async fn run(client: RpcClient, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "sockrpc CLI".bold().cyan());
    println!("Connecting to {}...", addr);

    client
        .connect(|| eprintln!("\n{}", "Connection closed by server".red()))
        .await?;
    println!("{}", "Connected!".green());

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".sockrpc_history"))
        .unwrap_or_else(|_| ".sockrpc_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "sockrpc>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&client, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    client.close();
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn execute_repl_command(
    client: &RpcClient,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let parts = split_line(line);
    let Some((cmd, args)) = parts.split_first() else {
        return Ok(Some(String::new()));
    };

    match cmd.to_lowercase().as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "ping" => {
            let reply = client.call_text::<&str>("ping", &[]).await?;
            Ok(Some(reply.green().to_string()))
        }

        "send" => {
            if args.is_empty() {
                return Ok(Some("Usage: send <message>".to_string()));
            }
            client.send(args.join(" ")).await?;
            Ok(Some("Sent".green().to_string()))
        }

        _ => {
            let reply = client.call_args(cmd, args).await?;
            Ok(Some(format_reply(&reply)))
        }
    }
}
