//! One-shot commands.

use colored::Colorize;
use framecast_chat::{PingPacket, PongPacket};
use framecast_client::Client;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const PONG_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends `count` pings and prints the round trip of each.
pub async fn ping(client: &Client, addr: &str, count: u32) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, mut pongs) = mpsc::unbounded_channel();
    client.register_handler(move |_client: Client, _pong: PongPacket| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(Instant::now());
        }
    })?;

    client.connect(addr).await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;
    let receiver = client.spawn_receive_loop();

    for seq in 1..=count {
        let sent = Instant::now();
        client.send(&PingPacket).await?;

        match tokio::time::timeout(PONG_TIMEOUT, pongs.recv()).await {
            Ok(Some(received)) => {
                let rtt = received.duration_since(sent);
                println!(
                    "{} from {}: seq={} time={:.2}ms",
                    "PONG".green(),
                    addr,
                    seq,
                    rtt.as_secs_f64() * 1000.0
                );
            }
            Ok(None) => return Err("connection closed".into()),
            Err(_) => println!("{} seq={}", "Timed out".yellow(), seq),
        }
    }

    client.close();
    let _ = receiver.await;
    Ok(())
}
