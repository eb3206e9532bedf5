//! WebSocket connection handling
//!
//! The accept loop admits connections through the `ConnectionGuard`, and
//! each admitted connection gets a handler task: WebSocket handshake,
//! message parsing, and bidirectional communication with the ChatServer.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::ChatConfig;
use crate::error::AppError;
use crate::guard::{ConnectionGuard, ConnectionPermit};
use crate::message::{ClientMessage, ServerMessage};
use crate::server::ServerCommand;
use crate::shutdown::ShutdownCoordinator;
use crate::types::ConnectionId;

/// Accept connections until shutdown begins
///
/// Connections from an origin that is already at its limit are closed
/// before the handshake. Admitted connections run on the coordinator's
/// task tracker.
pub async fn serve(
    listener: TcpListener,
    config: ChatConfig,
    cmd_tx: mpsc::Sender<ServerCommand>,
    coordinator: ShutdownCoordinator,
) {
    let guard = ConnectionGuard::new(config.max_connections_per_origin);
    let token = coordinator.token();

    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                let Some(permit) = guard.try_admit(addr.ip()) else {
                    warn!(
                        "Refusing connection from {}: {} ({} open)",
                        addr,
                        AppError::CapacityExceeded(addr.ip()),
                        guard.active(addr.ip())
                    );
                    drop(stream);
                    continue;
                };

                debug!("Accepted connection from {}", addr);
                let cmd_tx = cmd_tx.clone();
                let ws_config = config.websocket_config();
                let outbound_buffer = config.outbound_buffer;
                let flush_timeout = config.drain_timeout;

                // Spawn handler task for each connection
                coordinator.tracker().spawn(async move {
                    let result = handle_connection(
                        stream,
                        permit,
                        cmd_tx,
                        ws_config,
                        outbound_buffer,
                        flush_timeout,
                    )
                    .await;
                    if let Err(e) = result {
                        warn!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }

    info!("Stopped accepting connections");
}

/// Handle an admitted TCP connection
///
/// Performs the WebSocket handshake, registers with the ChatServer and
/// relays frames both ways until either side closes. The permit is held
/// for the lifetime of the connection. Once the peer stops sending, queued
/// events get at most `flush_timeout` to reach it.
pub async fn handle_connection(
    stream: TcpStream,
    permit: ConnectionPermit,
    cmd_tx: mpsc::Sender<ServerCommand>,
    ws_config: WebSocketConfig,
    outbound_buffer: usize,
    flush_timeout: Duration,
) -> Result<(), AppError> {
    let origin = permit.origin();

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config)).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = ConnectionId::new();
    info!("Connection {} established from {}", connection_id, origin);

    // Create channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(outbound_buffer);

    // Register with ChatServer
    if cmd_tx
        .send(ServerCommand::Connect {
            connection_id,
            origin,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register connection {} - server closed", connection_id);
        return Err(AppError::ChannelSend);
    }

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (WebSocket -> ServerCommand)
    let mut read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    let cmd = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => client_message_to_command(connection_id, client_msg),
                        Err(e) => ServerCommand::InvalidMessage {
                            connection_id,
                            reason: e.to_string(),
                        },
                    };
                    if cmd_tx_read.send(cmd).await.is_err() {
                        debug!("Server closed, ending read task for {}", connection_id);
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Connection {} sent close frame", connection_id);
                    break;
                }
                Ok(_) => {
                    // Ping/pong are answered by tungstenite; binary is ignored
                }
                Err(e) => {
                    warn!("WebSocket error for {}: {}", connection_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", connection_id);
    });

    // Spawn write task (ServerMessage -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
        debug!("Write task ended for {}", connection_id);

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    let reader_finished = tokio::select! {
        _ = &mut read_task => true,
        _ = &mut write_task => false,
    };

    let _ = cmd_tx
        .send(ServerCommand::Disconnect { connection_id })
        .await;

    if reader_finished {
        // The server drops its sender on disconnect; let queued events flush
        if !flush_writer(&mut write_task, flush_timeout).await {
            warn!("Connection {} did not drain in {:?}, closing", connection_id, flush_timeout);
        }
    } else {
        read_task.abort();
    }

    info!("Connection {} from {} closed", connection_id, origin);
    drop(permit);

    Ok(())
}

/// Wait up to `limit` for the write task, aborting it on expiry.
///
/// Returns false if the task had to be aborted.
async fn flush_writer(write_task: &mut JoinHandle<()>, limit: Duration) -> bool {
    if tokio::time::timeout(limit, &mut *write_task).await.is_ok() {
        return true;
    }
    write_task.abort();
    false
}

/// Convert a ClientMessage to a ServerCommand
fn client_message_to_command(connection_id: ConnectionId, msg: ClientMessage) -> ServerCommand {
    match msg {
        ClientMessage::Login { nick } => ServerCommand::Login {
            connection_id,
            nick,
        },
        ClientMessage::SendMessage { message } => ServerCommand::SendMessage {
            connection_id,
            message,
        },
        ClientMessage::Typing { typing } => ServerCommand::Typing {
            connection_id,
            typing,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_flush_writer_waits_for_finished_writer() {
        let mut task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
        });
        assert!(flush_writer(&mut task, Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writer_aborts_stuck_writer() {
        // A peer that never reads keeps the writer pending forever
        let mut task = tokio::spawn(std::future::pending::<()>());
        assert!(!flush_writer(&mut task, Duration::from_secs(5)).await);
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_client_message_to_command() {
        let id = ConnectionId::new();
        let cmd = client_message_to_command(id, ClientMessage::Typing { typing: true });
        assert!(matches!(
            cmd,
            ServerCommand::Typing { connection_id, typing: true } if connection_id == id
        ));
    }
}
