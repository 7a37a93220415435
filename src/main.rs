//! framecast - chat relay server
//!
//! Accepts chat clients over TCP and relays their messages and presence
//! to everyone else in the room.

mod room;

use framecast_server::{Config, SessionManager};
use room::ChatRoom;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if FRAMECAST_CONFIG is set, then env overrides)
    let config_path = std::env::var("FRAMECAST_CONFIG").ok();
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

    tracing::info!("Starting framecast chat relay");
    tracing::info!("  Bind address: {}:{}", config.network.bind_ip, config.network.port);
    tracing::info!("  Framing: {}", config.protocol.framing);
    tracing::info!("  Max packet size: {}", config.protocol.max_packet_size);
    if config.network.idle_timeout_secs == 0 {
        tracing::info!("  Idle timeout: disabled");
    } else {
        tracing::info!("  Idle timeout: {}s", config.network.idle_timeout_secs);
    }

    let room = Arc::new(ChatRoom::new());
    let sessions = SessionManager::new(room.attach(config.server_config()))?;
    room.install(&sessions)?;

    // Spawn shutdown signal handler
    let shutdown_sessions = sessions.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_sessions.stop();
    });

    // Run server (blocks until stop)
    match sessions.start(config.network.port).await {
        Err(e) if e.is_listener_closed() => {}
        Err(e) => {
            tracing::error!("Server failed: {}", e);
            return Err(e.into());
        }
        Ok(()) => {}
    }

    tracing::info!("Server stopped");
    Ok(())
}
