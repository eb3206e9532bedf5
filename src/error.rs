//! Error types for the chat hub
//!
//! Defines application-level errors, input validation errors and
//! outbound delivery errors. Uses thiserror for ergonomic error definitions.

use std::net::IpAddr;

use thiserror::Error;

use crate::types::ConnectionId;

/// Application-level errors
///
/// Covers both fatal errors (connection termination, startup failure) and
/// business errors (reported to the offending client, state unchanged).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Nickname or message body failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Another live session already holds this nickname
    #[error("Nickname already in use: {0}")]
    NicknameTaken(String),

    /// Nickname is on the ban list
    #[error("Nickname is banned: {0}")]
    NicknameBanned(String),

    /// Chat operation attempted before login
    #[error("Not logged in")]
    NotLoggedIn,

    /// Too many messages within the rate-limit window
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Origin already holds the maximum number of connections
    #[error("Too many connections from {0}")]
    CapacityExceeded(IpAddr),

    /// Command referenced a connection the server does not know
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),
}

impl AppError {
    /// Whether this error indicates a server-side fault rather than bad input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::WebSocket(_)
                | AppError::Io(_)
                | AppError::ChannelSend
                | AppError::Config(_)
                | AppError::UnknownConnection(_)
        )
    }
}

/// Nickname and message shape errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Nick can't be empty.")]
    EmptyNickname,

    #[error("Nick can't be longer than {max} characters.")]
    NicknameTooLong { max: usize },

    #[error("Nick contains invalid character '{0}'. Use letters, digits, '_' or '-'.")]
    InvalidNicknameChar(char),

    #[error("Message can't be empty.")]
    EmptyMessage,

    #[error("Message can't be longer than {max} characters.")]
    MessageTooLong { max: usize },
}

impl ValidationError {
    /// Whether the error concerns the nickname (as opposed to a message body)
    pub fn is_nickname(&self) -> bool {
        matches!(
            self,
            ValidationError::EmptyNickname
                | ValidationError::NicknameTooLong { .. }
                | ValidationError::InvalidNicknameChar(_)
        )
    }
}

/// Message send errors
///
/// Occurs when pushing an event to a single client fails.
/// Never affects delivery to other clients.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The client's outbound queue is full (slow consumer)
    #[error("Outbound queue full")]
    Full,
}
