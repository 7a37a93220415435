//! Interactive chat session.

use colored::Colorize;
use framecast_chat::{
    validate_name, ConnectRequest, ConnectResponse, ConnectedPacket, DisconnectedPacket,
    MessagePacket, PongPacket,
};
use framecast_client::Client;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const HELP_TEXT: &str = "Type a message and press enter to send it. /quit leaves the chat.";

pub async fn run(
    client: Client,
    addr: &str,
    name: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "framecast chat".bold().cyan());

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let name = match name {
        Some(name) => name.trim().to_string(),
        None => prompt_name(&mut input).await?,
    };
    validate_name(&name)?;

    register_handlers(&client)?;

    tracing::debug!("Joining {} as \"{}\"", addr, name);
    println!("Connecting to {}...", addr);
    client.connect(addr).await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;
    println!("{}", "Connected!".green());

    client.send(&ConnectRequest::new(name.as_str())).await?;
    let mut receiver = client.spawn_receive_loop();

    println!("{}\n", HELP_TEXT.dimmed());

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" || line == "/exit" {
                    break;
                }
                if let Err(e) = client.send(&MessagePacket::new(line)).await {
                    println!("{}: {}", "Error".red(), e);
                    break;
                }
            }
            ended = &mut receiver => {
                tracing::debug!("Receive loop finished: {:?}", ended);
                match ended {
                    Ok(Ok(())) => println!("{}", "Server closed the connection".yellow()),
                    Ok(Err(e)) => println!("{}: {}", "Connection lost".red(), e),
                    Err(e) => println!("{}: {}", "Error".red(), e),
                }
                return Ok(());
            }
        }
    }

    let _ = client.disconnect().await;
    println!("{}", "Disconnected.".dimmed());
    Ok(())
}

async fn prompt_name(
    input: &mut Lines<BufReader<Stdin>>,
) -> Result<String, Box<dyn std::error::Error>> {
    use std::io::Write;

    print!("Enter a name: ");
    std::io::stdout().flush()?;
    let line = input.next_line().await?.unwrap_or_default();
    Ok(line.trim().to_string())
}

fn register_handlers(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
    client.register_handler(|client: Client, response: ConnectResponse| async move {
        if response.connected {
            println!("{}", "You have joined the chat".green());
        } else {
            println!(
                "{}: {}",
                "Server rejected the join request".red(),
                response.error_message
            );
            client.close();
        }
    })?;

    client.register_handler(|_client: Client, packet: ConnectedPacket| async move {
        println!("{}", format!("{} has joined the chat", packet.client_name).yellow());
    })?;

    client.register_handler(|_client: Client, packet: DisconnectedPacket| async move {
        println!("{}", format!("{} has left the chat", packet.client_name).yellow());
    })?;

    client.register_handler(|_client: Client, packet: MessagePacket| async move {
        println!("{}", packet.message);
    })?;

    client.register_passive::<PongPacket>()?;
    Ok(())
}
