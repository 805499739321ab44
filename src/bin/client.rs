//! Standalone client binary for RespVault
//!
//! Provides a command-line interface for interacting with the server

use bytes::Bytes;
use clap::Parser;
use respvault::Client;
use std::io::{self, Write};

/// RespVault interactive client
#[derive(Parser, Debug)]
#[command(name = "respvault-client")]
#[command(version)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:4567")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Connecting to RespVault server at {}...", args.addr);
    let mut client = Client::connect(&args.addr).await?;
    println!("Connected! Type 'help' for available commands or 'quit' to exit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "exit" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                print_help();
            }
            _ => {
                if let Err(e) = handle_command(&mut client, input).await {
                    println!("Error: {}", e);
                }
            }
        }
    }

    client.close().await?;
    Ok(())
}

async fn handle_command(client: &mut Client, input: &str) -> Result<(), Box<dyn std::error::Error>> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let args = &parts[1..];

    match parts[0].to_ascii_lowercase().as_str() {
        "set" => {
            if args.len() != 2 {
                println!("Usage: set <key> <value>");
                return Ok(());
            }
            println!("{}", client.set(args[0], args[1]).await?);
        }
        "get" => {
            if args.len() != 1 {
                println!("Usage: get <key>");
                return Ok(());
            }
            println!("{}", render(client.get(args[0]).await?.as_ref()));
        }
        "delete" | "del" => {
            if args.len() != 1 {
                println!("Usage: delete <key>");
                return Ok(());
            }
            println!("{}", client.delete(args[0]).await?);
        }
        "mget" => {
            let values = client.mget(args.iter()).await?;
            for (i, value) in values.iter().enumerate() {
                println!("{}) {}", i + 1, render(value.as_ref()));
            }
        }
        "mset" => {
            if args.len() % 2 != 0 {
                println!("Usage: mset <key> <value> [<key> <value> ...]");
                return Ok(());
            }
            let pairs = args.chunks(2).map(|pair| (pair[0], pair[1]));
            println!("{}", client.mset(pairs).await?);
        }
        _ => {
            println!("Unknown command: {}. Type 'help' for available commands.", parts[0]);
        }
    }

    Ok(())
}

fn render(value: Option<&Bytes>) -> String {
    match value {
        Some(value) => format!("{:?}", String::from_utf8_lossy(value)),
        None => "(nil)".to_string(),
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  set <key> <value>          - Set a key-value pair");
    println!("  get <key>                  - Get value by key");
    println!("  delete <key>               - Delete a key");
    println!("  mget <key> [<key> ...]     - Get several keys");
    println!("  mset <key> <value> [...]   - Set several key-value pairs");
    println!("  help                       - Show this help message");
    println!("  quit                       - Exit the client");
}
