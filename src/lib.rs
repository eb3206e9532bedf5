//! Presence Hub Library
//!
//! A single-room WebSocket chat hub built with tokio-tungstenite using the
//! Actor pattern for state management.
//!
//! # Features
//! - Unique, case-sensitive nickname login (re-login replaces the session)
//! - Room-wide message broadcast with a bounded replay cache
//! - Per-session sliding-window rate limiting
//! - Debounced typing indicators with automatic expiry
//! - Per-origin connection capping
//! - Graceful shutdown with client notification and connection draining
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning sessions, cache and room
//! - Each connection has a `handler` task communicating with the server
//! - Typing timers and the janitor post commands back to the actor
//! - Only the per-origin `ConnectionGuard` is shared outside the actor
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use presence_hub::{serve, ChatConfig, ChatServer, ShutdownCoordinator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ChatConfig::default();
//!     let listener = TcpListener::bind(&config.bind_addr).await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(ChatServer::new(config.clone(), cmd_rx, cmd_tx.downgrade()).run());
//!
//!     let coordinator = ShutdownCoordinator::new(cmd_tx.clone());
//!     serve(listener, config, cmd_tx, coordinator).await;
//! }
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod guard;
pub mod handler;
pub mod hub;
pub mod message;
pub mod rate_limit;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod typing;
pub mod types;
pub mod validation;

// Re-export main types for convenience
pub use cache::MessageCache;
pub use config::ChatConfig;
pub use connection::Connection;
pub use error::{AppError, SendError, ValidationError};
pub use guard::{ConnectionGuard, ConnectionPermit};
pub use handler::{handle_connection, serve};
pub use hub::{BroadcastHub, EventSink};
pub use message::{ClientMessage, ErrorCode, MessageRecord, ServerMessage};
pub use rate_limit::{RateLimiter, RATE_LIMIT_WINDOW};
pub use server::{ChatServer, ServerCommand};
pub use session::{Session, SessionTable};
pub use shutdown::ShutdownCoordinator;
pub use typing::TypingDebouncer;
pub use types::{ConnectionId, MessageId, Nickname};
