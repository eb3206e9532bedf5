//! Configuration for the chat hub.
//!
//! Defaults can be overridden via environment variables:
//!
//! - `CHAT_BIND_ADDR`                  (default: "127.0.0.1:8090")
//! - `CHAT_MAX_MESSAGE_LENGTH`         (default: 500)
//! - `CHAT_MAX_NICK_LENGTH`            (default: 20)
//! - `CHAT_CACHE_SIZE`                 (default: 50)
//! - `CHAT_TYPING_TIMEOUT_MS`          (default: 5000)
//! - `CHAT_MESSAGE_RATE_LIMIT`         (default: 30 messages per 60s)
//! - `CHAT_MAX_CONNECTIONS_PER_ORIGIN` (default: 3)
//! - `CHAT_JANITOR_INTERVAL_SECS`      (default: 300)
//! - `CHAT_MAX_BUFFER_SIZE_MB`         (default: 1)
//! - `CHAT_OUTBOUND_BUFFER`            (default: 128)
//! - `CHAT_DRAIN_TIMEOUT_SECS`         (default: 5)
//! - `CHAT_BANNED_NICKS`               (default: empty, comma-separated)

use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::error::AppError;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Address to listen on (e.g. "0.0.0.0:8090").
    pub bind_addr: String,

    /// Longest accepted message body, in characters.
    pub max_message_length: usize,

    /// Longest accepted nickname, in characters.
    pub max_nick_length: usize,

    /// Number of recent messages replayed to newly joined clients.
    pub cache_size: usize,

    /// Inactivity before a typing indicator is cleared automatically.
    pub typing_timeout: Duration,

    /// Messages allowed per session within the 60 second window.
    pub message_rate_limit: usize,

    /// Concurrent transport connections allowed from one IP.
    pub max_connections_per_origin: usize,

    /// Period of the rate-limit janitor.
    pub janitor_interval: Duration,

    /// Largest accepted WebSocket message, in bytes.
    pub max_frame_bytes: usize,

    /// Per-connection outbound event queue capacity.
    pub outbound_buffer: usize,

    /// How long shutdown waits for connections to flush and close.
    pub drain_timeout: Duration,

    /// Nicknames refused at login.
    pub banned_nicknames: HashSet<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8090".to_string(),
            max_message_length: 500,
            max_nick_length: 20,
            cache_size: 50,
            typing_timeout: Duration::from_millis(5000),
            message_rate_limit: 30,
            max_connections_per_origin: 3,
            janitor_interval: Duration::from_secs(300),
            max_frame_bytes: 1024 * 1024,
            outbound_buffer: 128,
            drain_timeout: Duration::from_secs(5),
            banned_nicknames: HashSet::new(),
        }
    }
}

impl ChatConfig {
    /// Construct a `ChatConfig` from environment variables, falling back
    /// to the defaults.
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let bind_addr = env::var("CHAT_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let max_message_length =
            read_env_or_default("CHAT_MAX_MESSAGE_LENGTH", defaults.max_message_length)?;
        let max_nick_length =
            read_env_or_default("CHAT_MAX_NICK_LENGTH", defaults.max_nick_length)?;
        let cache_size = read_env_or_default("CHAT_CACHE_SIZE", defaults.cache_size)?;
        let typing_timeout_ms: u64 = read_env_or_default("CHAT_TYPING_TIMEOUT_MS", 5000)?;
        let message_rate_limit =
            read_env_or_default("CHAT_MESSAGE_RATE_LIMIT", defaults.message_rate_limit)?;
        let max_connections_per_origin = read_env_or_default(
            "CHAT_MAX_CONNECTIONS_PER_ORIGIN",
            defaults.max_connections_per_origin,
        )?;
        let janitor_secs: u64 = read_env_or_default("CHAT_JANITOR_INTERVAL_SECS", 300)?;
        let buffer_mb: usize = read_env_or_default("CHAT_MAX_BUFFER_SIZE_MB", 1)?;
        let outbound_buffer =
            read_env_or_default("CHAT_OUTBOUND_BUFFER", defaults.outbound_buffer)?;
        let drain_secs: u64 = read_env_or_default("CHAT_DRAIN_TIMEOUT_SECS", 5)?;
        let banned_nicknames = env::var("CHAT_BANNED_NICKS")
            .map(|list| parse_nick_list(&list))
            .unwrap_or_default();

        if janitor_secs == 0 {
            return Err(AppError::Config(
                "CHAT_JANITOR_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        if outbound_buffer == 0 {
            return Err(AppError::Config(
                "CHAT_OUTBOUND_BUFFER must be greater than zero".to_string(),
            ));
        }

        Ok(ChatConfig {
            bind_addr,
            max_message_length,
            max_nick_length,
            cache_size,
            typing_timeout: Duration::from_millis(typing_timeout_ms),
            message_rate_limit,
            max_connections_per_origin,
            janitor_interval: Duration::from_secs(janitor_secs),
            max_frame_bytes: buffer_mb.saturating_mul(1024 * 1024),
            outbound_buffer,
            drain_timeout: Duration::from_secs(drain_secs),
            banned_nicknames,
        })
    }

    /// WebSocket settings applied at handshake.
    pub fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_frame_bytes);
        config.max_frame_size = Some(self.max_frame_bytes);
        config
    }
}

fn read_env_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::Config(format!("{key}={val:?}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn parse_nick_list(list: &str) -> HashSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|nick| !nick.is_empty())
        .map(str::to_string)
        .collect()
}
