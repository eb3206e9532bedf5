//! ChatServer Actor implementation
//!
//! The central actor that owns all shared state: connections, sessions,
//! message cache, room membership and typing timers. Connection handlers,
//! typing timers and the janitor all talk to it through `ServerCommand`s,
//! so every check-then-act on that state runs without interleaving.

use std::collections::HashMap;
use std::net::IpAddr;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::MessageCache;
use crate::config::ChatConfig;
use crate::connection::Connection;
use crate::error::AppError;
use crate::hub::BroadcastHub;
use crate::message::{ErrorCode, MessageRecord, ServerMessage};
use crate::rate_limit::RateLimiter;
use crate::session::{Session, SessionTable};
use crate::typing::TypingDebouncer;
use crate::types::{unix_millis, ConnectionId, MessageId};
use crate::validation::validate_message_body;

/// Commands sent to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Transport connection established
    Connect {
        connection_id: ConnectionId,
        origin: IpAddr,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Transport connection closed
    Disconnect { connection_id: ConnectionId },
    /// Request a nickname
    Login {
        connection_id: ConnectionId,
        nick: String,
    },
    /// Send a chat message
    SendMessage {
        connection_id: ConnectionId,
        message: String,
    },
    /// Typing indicator changed
    Typing {
        connection_id: ConnectionId,
        typing: bool,
    },
    /// Client sent a frame that could not be parsed
    InvalidMessage {
        connection_id: ConnectionId,
        reason: String,
    },
    /// A typing expiry timer fired
    TypingExpired {
        connection_id: ConnectionId,
        generation: u64,
    },
    /// Periodic rate-limit window maintenance
    PruneRateWindows,
    /// Notify everyone and release all state; `done` fires afterwards
    Shutdown {
        message: String,
        done: oneshot::Sender<()>,
    },
}

/// The main ChatServer actor
pub struct ChatServer {
    config: ChatConfig,
    /// All transport connections, logged in or not
    connections: HashMap<ConnectionId, Connection>,
    sessions: SessionTable,
    cache: MessageCache,
    hub: BroadcastHub,
    typing: TypingDebouncer,
    rate_limiter: RateLimiter,
    last_message_id: u64,
    shutting_down: bool,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
    /// Handle for timers to post back to this actor
    notify: mpsc::WeakSender<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer.
    ///
    /// `notify` should be a downgraded sender of the same channel as
    /// `receiver`; it is used to arm typing timers without keeping the
    /// channel open.
    pub fn new(
        config: ChatConfig,
        receiver: mpsc::Receiver<ServerCommand>,
        notify: mpsc::WeakSender<ServerCommand>,
    ) -> Self {
        Self {
            sessions: SessionTable::new(config.max_nick_length, config.banned_nicknames.clone()),
            cache: MessageCache::new(config.cache_size),
            hub: BroadcastHub::new(),
            typing: TypingDebouncer::new(config.typing_timeout),
            rate_limiter: RateLimiter::new(config.message_rate_limit),
            connections: HashMap::new(),
            last_message_id: 0,
            shutting_down: false,
            receiver,
            notify,
            config,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Processes commands until a `Shutdown` command or until all senders
    /// are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
            if self.shutting_down {
                break;
            }
        }

        self.typing.cancel_all();
        info!("ChatServer stopped");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect {
                connection_id,
                origin,
                sender,
            } => {
                self.handle_connect(connection_id, origin, sender);
            }
            ServerCommand::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id);
            }
            ServerCommand::Login {
                connection_id,
                nick,
            } => {
                let result = self.handle_login(connection_id, &nick);
                self.report(connection_id, result);
            }
            ServerCommand::SendMessage {
                connection_id,
                message,
            } => {
                let result = self.handle_send_message(connection_id, &message);
                self.report(connection_id, result);
            }
            ServerCommand::Typing {
                connection_id,
                typing,
            } => {
                self.handle_typing(connection_id, typing);
            }
            ServerCommand::InvalidMessage {
                connection_id,
                reason,
            } => {
                warn!("Invalid message from {}: {}", connection_id, reason);
                self.reply(
                    connection_id,
                    ServerMessage::Error {
                        code: ErrorCode::InvalidMessage,
                        message: format!("Invalid message format: {}", reason),
                    },
                );
            }
            ServerCommand::TypingExpired {
                connection_id,
                generation,
            } => {
                self.handle_typing_expired(connection_id, generation);
            }
            ServerCommand::PruneRateWindows => {
                self.prune_rate_windows();
            }
            ServerCommand::Shutdown { message, done } => {
                self.handle_shutdown(message);
                let _ = done.send(());
            }
        }
    }

    /// Send a failed command's error to the connection that issued it
    fn report(&self, connection_id: ConnectionId, result: Result<(), AppError>) {
        let Err(err) = result else {
            return;
        };

        if err.is_internal() {
            error!("Command from {} failed: {}", connection_id, err);
        } else {
            debug!("Rejected request from {}: {}", connection_id, err);
        }
        self.reply(connection_id, err.into());
    }

    /// Send a message to one connection, logged in or not
    fn reply(&self, connection_id: ConnectionId, msg: ServerMessage) {
        if let Some(conn) = self.connections.get(&connection_id) {
            if let Err(e) = conn.send(msg) {
                debug!("Reply to {} dropped: {}", connection_id, e);
            }
        }
    }

    /// Handle new transport connection
    fn handle_connect(
        &mut self,
        connection_id: ConnectionId,
        origin: IpAddr,
        sender: mpsc::Sender<ServerMessage>,
    ) {
        info!("Connection {} registered from {}", connection_id, origin);
        self.connections
            .insert(connection_id, Connection::new(connection_id, origin, sender));
        debug!(
            "Total connections: {}, logged in: {}",
            self.connections.len(),
            self.sessions.len()
        );
    }

    /// Handle transport disconnection
    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        let Some(conn) = self.connections.remove(&connection_id) else {
            return;
        };
        info!("Connection {} from {} closed", connection_id, conn.origin);

        if let Some(session) = self.sessions.logout_connection(connection_id) {
            self.end_session(session);
        }

        debug!(
            "Total connections: {}, logged in: {}",
            self.connections.len(),
            self.sessions.len()
        );
    }

    /// Handle login (or re-login) request
    fn handle_login(&mut self, connection_id: ConnectionId, nick: &str) -> Result<(), AppError> {
        let origin = self
            .connections
            .get(&connection_id)
            .map(|c| c.origin)
            .ok_or(AppError::UnknownConnection(connection_id))?;

        let outcome = self.sessions.login(connection_id, origin, nick)?;

        if let Some(previous) = outcome.replaced {
            self.end_session(previous);
        }

        let Some(conn) = self.connections.get(&connection_id) else {
            return Err(AppError::UnknownConnection(connection_id));
        };
        let sink = conn.sink();

        info!("User {} joined from {}", outcome.nickname, origin);

        let now = unix_millis();
        self.hub.join(
            connection_id,
            sink,
            &ServerMessage::UserJoined {
                nick: outcome.nickname.clone(),
                timestamp: now,
            },
        );

        self.hub.send_to(
            connection_id,
            ServerMessage::LoginSuccess {
                users: self.sessions.list_nicknames(),
                server_time: now,
            },
        );

        if !self.cache.is_empty() {
            debug!("Replaying {} cached messages to {}", self.cache.len(), outcome.nickname);
            self.hub.send_to(
                connection_id,
                ServerMessage::PreviousMessages {
                    messages: self.cache.snapshot(),
                },
            );
        }

        Ok(())
    }

    /// Handle chat message
    fn handle_send_message(
        &mut self,
        connection_id: ConnectionId,
        message: &str,
    ) -> Result<(), AppError> {
        let max_len = self.config.max_message_length;
        let session = self
            .sessions
            .by_connection_mut(connection_id)
            .ok_or(AppError::NotLoggedIn)?;

        let body = validate_message_body(message, max_len)?;

        let now = Instant::now();
        if !self
            .rate_limiter
            .record_and_check(&mut session.recent_messages, now)
        {
            warn!(
                "User {} hit the message rate limit ({} per window)",
                session.nickname,
                self.rate_limiter.limit()
            );
            return Err(AppError::RateLimited);
        }
        self.rate_limiter.commit(&mut session.recent_messages, now);

        let from = session.nickname.clone();
        let was_typing = std::mem::replace(&mut session.is_typing, false);
        let timestamp = unix_millis();

        // Sending ends the typing state
        if was_typing {
            self.typing.cancel(connection_id);
            self.hub.broadcast_except(
                connection_id,
                &ServerMessage::UserTyping {
                    nick: from.clone(),
                    typing: false,
                    timestamp,
                },
            );
        }

        self.last_message_id += 1;
        let record = MessageRecord {
            id: MessageId(self.last_message_id),
            from,
            body,
            timestamp,
        };

        debug!("User {} sent message {}", record.from, record.id);
        self.cache.append(record.clone());
        self.hub.broadcast_to_all(&ServerMessage::NewMessage(record));

        Ok(())
    }

    /// Handle typing indicator change. Ignored before login.
    fn handle_typing(&mut self, connection_id: ConnectionId, typing: bool) {
        let Some(session) = self.sessions.by_connection_mut(connection_id) else {
            return;
        };

        if self.typing.set_typing(session, typing, &self.notify) {
            debug!(
                "{} {} typing",
                session.nickname,
                if typing { "is" } else { "is not" }
            );
            let msg = ServerMessage::UserTyping {
                nick: session.nickname.clone(),
                typing,
                timestamp: unix_millis(),
            };
            self.hub.broadcast_except(connection_id, &msg);
        }
    }

    /// Handle a typing timer firing
    fn handle_typing_expired(&mut self, connection_id: ConnectionId, generation: u64) {
        let Some(session) = self.sessions.by_connection_mut(connection_id) else {
            return;
        };

        if self.typing.expire(session, generation) {
            debug!("Typing indicator for {} expired", session.nickname);
            let msg = ServerMessage::UserTyping {
                nick: session.nickname.clone(),
                typing: false,
                timestamp: unix_millis(),
            };
            self.hub.broadcast_except(connection_id, &msg);
        }
    }

    /// Prune every session's rate-limit window
    fn prune_rate_windows(&mut self) {
        let now = Instant::now();
        let limiter = self.rate_limiter;
        let mut pruned = 0;

        for session in self.sessions.sessions_mut() {
            let before = session.recent_messages.len();
            limiter.prune(&mut session.recent_messages, now);
            pruned += before - session.recent_messages.len();
        }

        debug!(
            "Janitor pruned {} rate-limit entries across {} sessions",
            pruned,
            self.sessions.len()
        );
    }

    /// Notify all connections and release every session
    fn handle_shutdown(&mut self, message: String) {
        info!(
            "Shutting down: notifying {} connections ({} logged in)",
            self.connections.len(),
            self.sessions.len()
        );
        self.shutting_down = true;
        self.typing.cancel_all();

        let notice = ServerMessage::ServerShutdown { message };
        self.hub.broadcast_to_all(&notice);
        for conn in self.connections.values() {
            if !self.hub.contains(conn.id) {
                let _ = conn.send(notice.clone());
            }
        }

        // Dropping every sender lets each write task flush and close
        self.hub.clear();
        self.sessions.drain();
        self.connections.clear();
    }

    /// Tear down a session that has already left the table
    fn end_session(&mut self, session: Session) {
        self.typing.cancel(session.connection_id);
        self.hub.leave(session.connection_id);

        info!("User {} left", session.nickname);
        self.hub.broadcast_to_all(&ServerMessage::UserLeft {
            nick: session.nickname,
            timestamp: unix_millis(),
        });
    }
}
