//! Graceful shutdown and periodic maintenance
//!
//! `ShutdownCoordinator` owns the cancellation token observed by the accept
//! loop and the janitor, and the tracker of every spawned connection task.
//! Shutdown cancels the token, has the server actor notify all clients and
//! drop their outbound channels, then waits (bounded) for the connection
//! tasks to flush and close their sockets.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::server::ServerCommand;

/// Coordinates process-wide shutdown
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    cmd_tx: mpsc::Sender<ServerCommand>,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    pub fn new(cmd_tx: mpsc::Sender<ServerCommand>) -> Self {
        Self {
            cmd_tx,
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Cancelled when shutdown begins
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker for tasks that must finish before the process exits
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Spawn the janitor that asks the server to prune idle sessions'
    /// rate-limit windows every `period`.
    pub fn spawn_janitor(&self, period: Duration) {
        let cmd_tx = self.cmd_tx.clone();
        let token = self.token.clone();

        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if cmd_tx.send(ServerCommand::PruneRateWindows).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Janitor stopped");
        });
    }

    /// Shut down: stop accepting, notify clients, drain connections.
    ///
    /// Waits at most `drain_timeout` for tracked tasks to finish.
    pub async fn shutdown(
        &self,
        message: impl Into<String>,
        drain_timeout: Duration,
    ) -> Result<(), AppError> {
        info!("Shutdown requested");
        self.token.cancel();

        let (done_tx, done_rx) = oneshot::channel();
        self.cmd_tx
            .send(ServerCommand::Shutdown {
                message: message.into(),
                done: done_tx,
            })
            .await
            .map_err(|_| AppError::ChannelSend)?;
        if done_rx.await.is_err() {
            warn!("ChatServer exited before acknowledging shutdown");
        }

        self.tracker.close();
        if tokio::time::timeout(drain_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "{} tasks still running after {:?} drain timeout",
                self.tracker.len(),
                drain_timeout
            );
        } else {
            info!("All connections drained");
        }

        Ok(())
    }
}
