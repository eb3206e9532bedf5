//! Transport connection record
//!
//! Represents a connected WebSocket client, logged in or not, with its
//! origin and outbound event channel.

use std::net::IpAddr;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::hub::EventSink;
use crate::message::ServerMessage;
use crate::types::ConnectionId;

/// Connected client information
///
/// Exists from handshake until disconnect. The logged-in identity, if any,
/// lives in the `SessionTable`.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Peer IP address
    pub origin: IpAddr,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Connection {
    /// Create a new connection record with the given ID and sender channel
    pub fn new(id: ConnectionId, origin: IpAddr, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, origin, sender }
    }

    /// Push a message to this client without waiting
    ///
    /// Returns an error if the channel is closed or the client is not
    /// keeping up.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.deliver(msg)
    }

    /// A sink handle for room membership
    pub fn sink(&self) -> Box<dyn EventSink> {
        Box::new(self.sender.clone())
    }
}
