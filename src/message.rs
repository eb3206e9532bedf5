//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization. Event names are kebab-case,
//! payload fields snake_case.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::{MessageId, Nickname};

/// Client → Server message
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Request a chat identity
    Login { nick: String },
    /// Send a chat message to the room
    SendMessage { message: String },
    /// Typing indicator on/off
    Typing { typing: bool },
}

/// A broadcast chat message, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub from: Nickname,
    #[serde(rename = "message")]
    pub body: String,
    pub timestamp: u64,
}

/// Server → Client message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Login accepted; sent to the joiner only
    LoginSuccess { users: Vec<Nickname>, server_time: u64 },
    /// Someone else joined the room
    UserJoined { nick: Nickname, timestamp: u64 },
    /// Cached history for the joiner
    PreviousMessages { messages: Vec<MessageRecord> },
    /// Chat message, delivered to every member
    NewMessage(MessageRecord),
    /// Another member's typing state changed
    UserTyping {
        nick: Nickname,
        typing: bool,
        timestamp: u64,
    },
    /// A member left the room
    UserLeft { nick: Nickname, timestamp: u64 },
    /// Request rejected
    Error { code: ErrorCode, message: String },
    /// Identity rejected or missing; client should prompt for a nickname
    ForceLogin { message: String },
    /// Server is about to terminate
    ServerShutdown { message: String },
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed frame or message body rejected by validation
    InvalidMessage,
    /// Too many messages in the rate-limit window
    RateLimited,
    /// Server-side fault
    InternalError,
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        match &err {
            AppError::Validation(e) if e.is_nickname() => ServerMessage::ForceLogin {
                message: e.to_string(),
            },
            AppError::Validation(e) => ServerMessage::Error {
                code: ErrorCode::InvalidMessage,
                message: e.to_string(),
            },
            AppError::NicknameTaken(_) => ServerMessage::ForceLogin {
                message: "This nick is already in chat.".to_string(),
            },
            AppError::NicknameBanned(_) => ServerMessage::ForceLogin {
                message: "This nick is banned.".to_string(),
            },
            AppError::NotLoggedIn => ServerMessage::ForceLogin {
                message: "You need to be logged in to send message.".to_string(),
            },
            AppError::RateLimited => ServerMessage::Error {
                code: ErrorCode::RateLimited,
                message: "You are sending messages too fast.".to_string(),
            },
            AppError::Json(e) => ServerMessage::Error {
                code: ErrorCode::InvalidMessage,
                message: format!("Invalid message format: {}", e),
            },
            // Internal faults are not described to the client
            _ => ServerMessage::Error {
                code: ErrorCode::InternalError,
                message: "Internal error".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn test_client_message_deserialize() {
        let json = r#"{"type": "login", "nick": "Alice"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Login { nick } => assert_eq!(nick, "Alice"),
            _ => panic!("Wrong variant"),
        }

        let json = r#"{"type": "send-message", "message": "hi"}"#;
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(json).unwrap(),
            ClientMessage::SendMessage { message } if message == "hi"
        ));

        let json = r#"{"type": "typing", "typing": true}"#;
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(json).unwrap(),
            ClientMessage::Typing { typing: true }
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"type": "create_room"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_new_message_serialize() {
        let msg = ServerMessage::NewMessage(MessageRecord {
            id: MessageId(7),
            from: Nickname::new_unchecked("bob"),
            body: "hello".to_string(),
            timestamp: 42,
        });
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "new-message",
                "id": 7,
                "from": "bob",
                "message": "hello",
                "timestamp": 42
            })
        );
    }

    #[test]
    fn test_login_success_serialize() {
        let msg = ServerMessage::LoginSuccess {
            users: vec![Nickname::new_unchecked("a"), Nickname::new_unchecked("b")],
            server_time: 1,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"login-success\""));
        assert!(json.contains("\"users\":[\"a\",\"b\"]"));
        assert!(json.contains("\"server_time\":1"));
    }

    #[test]
    fn test_error_mapping() {
        let msg: ServerMessage = AppError::NicknameTaken("alice".to_string()).into();
        assert!(matches!(msg, ServerMessage::ForceLogin { .. }));

        let msg: ServerMessage = AppError::Validation(ValidationError::EmptyMessage).into();
        assert!(matches!(
            msg,
            ServerMessage::Error { code: ErrorCode::InvalidMessage, .. }
        ));

        let msg: ServerMessage = AppError::RateLimited.into();
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"code\":\"rate_limited\""));

        let msg: ServerMessage = AppError::ChannelSend.into();
        assert!(matches!(
            msg,
            ServerMessage::Error { code: ErrorCode::InternalError, .. }
        ));
    }
}
