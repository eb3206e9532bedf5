//! Typing indicator debouncing
//!
//! A session is either idle or typing. Only real transitions are reported
//! to the caller for broadcast. While typing, every typing-start event
//! re-arms an expiry timer; when it fires, the timer does not touch state
//! itself but sends `ServerCommand::TypingExpired` back to the server
//! actor. Each arming gets a fresh generation number so an expiry that
//! raced with a reset or cancel is recognised as stale and ignored.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::WeakSender;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::server::ServerCommand;
use crate::session::Session;
use crate::types::ConnectionId;

#[derive(Debug)]
struct PendingExpiry {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Per-session typing expiry timers
#[derive(Debug)]
pub struct TypingDebouncer {
    timeout: Duration,
    timers: HashMap<ConnectionId, PendingExpiry>,
    next_generation: u64,
}

impl TypingDebouncer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            timers: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Apply a typing event from the session's own connection.
    ///
    /// Returns true if the session's typing flag changed and should be
    /// broadcast. A start while already typing only re-arms the timer.
    pub fn set_typing(
        &mut self,
        session: &mut Session,
        typing: bool,
        notify: &WeakSender<ServerCommand>,
    ) -> bool {
        if typing {
            self.arm(session.connection_id, notify);
            if session.is_typing {
                return false;
            }
            session.is_typing = true;
            true
        } else {
            self.cancel(session.connection_id);
            if !session.is_typing {
                return false;
            }
            session.is_typing = false;
            true
        }
    }

    /// Handle a fired timer.
    ///
    /// Returns true if the session went back to idle and the change should
    /// be broadcast; false if the expiry was stale.
    pub fn expire(&mut self, session: &mut Session, generation: u64) -> bool {
        match self.timers.get(&session.connection_id) {
            Some(pending) if pending.generation == generation => {
                self.timers.remove(&session.connection_id);
            }
            _ => {
                debug!(
                    "Ignoring stale typing expiry for {} (generation {})",
                    session.nickname, generation
                );
                return false;
            }
        }

        if !session.is_typing {
            return false;
        }
        session.is_typing = false;
        true
    }

    /// Cancel a session's pending timer, if any
    pub fn cancel(&mut self, connection_id: ConnectionId) {
        if let Some(pending) = self.timers.remove(&connection_id) {
            pending.handle.abort();
        }
    }

    /// Cancel every pending timer
    pub fn cancel_all(&mut self) {
        for (_, pending) in self.timers.drain() {
            pending.handle.abort();
        }
    }

    /// Number of armed timers
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    fn arm(&mut self, connection_id: ConnectionId, notify: &WeakSender<ServerCommand>) {
        self.cancel(connection_id);

        self.next_generation += 1;
        let generation = self.next_generation;
        let timeout = self.timeout;
        let notify = notify.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(tx) = notify.upgrade() {
                let _ = tx
                    .send(ServerCommand::TypingExpired {
                        connection_id,
                        generation,
                    })
                    .await;
            }
        });

        self.timers
            .insert(connection_id, PendingExpiry { generation, handle });
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
