//! framecast-cli - Command-line chat client for framecast
//!
//! Joins a chat relay interactively, or pings it.

mod chat;
mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use framecast_chat::MAX_PACKET_SIZE;
use framecast_client::{Client, ClientConfig};
use framecast_protocol::Framing;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "framecast-cli")]
#[command(about = "Command-line chat client for framecast")]
#[command(version)]
struct Cli {
    /// Server address (host:port)
    #[arg(short, long, env = "FRAMECAST_SERVER", default_value = "127.0.0.1:20000")]
    server: String,

    /// Frame delimiting on the wire; must match the server
    #[arg(long, env = "FRAMECAST_FRAMING", default_value = "unframed")]
    framing: Framing,

    /// Seconds to wait for the connection to be established
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Largest frame in bytes; must match the server
    #[arg(long, default_value_t = MAX_PACKET_SIZE)]
    max_packet_size: usize,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the chat (the default)
    Chat {
        /// Name to join under (prompted for if omitted)
        #[arg(short, long, env = "FRAMECAST_NAME")]
        name: Option<String>,
    },

    /// Ping the server
    Ping {
        /// Number of pings to send
        #[arg(short, long, default_value_t = 1)]
        count: u32,
    },
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

    let config = ClientConfig::new(cli.max_packet_size)
        .with_framing(cli.framing)
        .with_connect_timeout(Duration::from_secs(cli.connect_timeout));
    let client = Client::new(config)?;

    let result = match cli.command {
        Some(Commands::Chat { name }) => chat::run(client, &cli.server, name).await,
        None => chat::run(client, &cli.server, None).await,
        Some(Commands::Ping { count }) => commands::ping(&client, &cli.server, count).await,
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }

    Ok(())
}
