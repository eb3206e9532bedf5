//! Presence Hub - Entry Point
//!
//! Loads configuration, starts the ChatServer actor, the janitor and the
//! accept loop, and shuts everything down on Ctrl-C.

use std::env;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use presence_hub::{serve, ChatConfig, ChatServer, ShutdownCoordinator};

/// Channel buffer size for server commands
const CHANNEL_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=presence_hub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("presence_hub=info")),
        )
        .init();

    let mut config = ChatConfig::from_env()?;

    // Bind address from command line overrides the environment
    if let Some(addr) = env::args().nth(1) {
        config.bind_addr = addr;
    }

    // Start TCP listener
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Presence hub listening on {}", config.bind_addr);

    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let server = ChatServer::new(config.clone(), cmd_rx, cmd_tx.downgrade());
    let server_task = tokio::spawn(server.run());

    let coordinator = ShutdownCoordinator::new(cmd_tx.clone());
    coordinator.spawn_janitor(config.janitor_interval);

    let accept_task = tokio::spawn(serve(
        listener,
        config.clone(),
        cmd_tx,
        coordinator.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C");

    coordinator
        .shutdown("Server is shutting down.", config.drain_timeout)
        .await?;

    let _ = accept_task.await;
    let _ = server_task.await;

    info!("Presence hub stopped");
    Ok(())
}
