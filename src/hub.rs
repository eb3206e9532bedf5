//! The single chat room: membership and event fan-out
//!
//! Members are addressed through `EventSink` handles so the hub does not
//! depend on the transport. Delivery is non-blocking: a member whose queue
//! is full or closed misses that event and nobody else is affected.

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ConnectionId;

/// Capability to push an event to one client
pub trait EventSink: Send + Sync {
    fn deliver(&self, msg: ServerMessage) -> Result<(), SendError>;
}

impl EventSink for mpsc::Sender<ServerMessage> {
    fn deliver(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}

/// Room membership and broadcast
#[derive(Default)]
pub struct BroadcastHub {
    members: IndexMap<ConnectionId, Box<dyn EventSink>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce `joined` to the current members, then add the joiner.
    ///
    /// The joiner never receives its own announcement.
    pub fn join(&mut self, id: ConnectionId, sink: Box<dyn EventSink>, joined: &ServerMessage) {
        self.broadcast_except(id, joined);
        self.members.insert(id, sink);
    }

    /// Remove a member. Returns false if it was not in the room.
    pub fn leave(&mut self, id: ConnectionId) -> bool {
        self.members.shift_remove(&id).is_some()
    }

    /// Deliver to every member. Returns the number of successful deliveries.
    pub fn broadcast_to_all(&self, msg: &ServerMessage) -> usize {
        let mut delivered = 0;
        for (id, sink) in &self.members {
            if Self::deliver_to(*id, &**sink, msg.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver to every member except `sender`.
    pub fn broadcast_except(&self, sender: ConnectionId, msg: &ServerMessage) -> usize {
        let mut delivered = 0;
        for (id, sink) in &self.members {
            if *id != sender && Self::deliver_to(*id, &**sink, msg.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver to one member
    pub fn send_to(&self, id: ConnectionId, msg: ServerMessage) -> bool {
        match self.members.get(&id) {
            Some(sink) => Self::deliver_to(id, &**sink, msg),
            None => false,
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Drop every member's sink
    pub fn clear(&mut self) {
        self.members.clear();
    }

    fn deliver_to(id: ConnectionId, sink: &dyn EventSink, msg: ServerMessage) -> bool {
        match sink.deliver(msg) {
            Ok(()) => true,
            Err(SendError::Full) => {
                warn!("Outbound queue full for {}, dropping event", id);
                false
            }
            Err(SendError::ChannelClosed) => {
                debug!("Connection {} already closed, dropping event", id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Nickname;

    fn left(nick: &str) -> ServerMessage {
        ServerMessage::UserLeft {
            nick: Nickname::new_unchecked(nick),
            timestamp: 0,
        }
    }

    fn member(
        hub: &mut BroadcastHub,
        capacity: usize,
    ) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel::<ServerMessage>(capacity);
        hub.join(id, Box::new(tx), &left("ignored"));
        (id, rx)
    }

    #[tokio::test]
    async fn test_join_announces_to_others_only() {
        let mut hub = BroadcastHub::new();
        let (_a, mut a_rx) = member(&mut hub, 8);

        let b = ConnectionId::new();
        let (b_tx, mut b_rx) = mpsc::channel::<ServerMessage>(8);
        let joined = ServerMessage::UserJoined {
            nick: Nickname::new_unchecked("b"),
            timestamp: 0,
        };
        hub.join(b, Box::new(b_tx), &joined);

        assert!(matches!(a_rx.try_recv().unwrap(), ServerMessage::UserJoined { .. }));
        assert!(b_rx.try_recv().is_err());
        assert_eq!(hub.len(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_all_and_except() {
        let mut hub = BroadcastHub::new();
        let (a, mut a_rx) = member(&mut hub, 8);
        let (_b, mut b_rx) = member(&mut hub, 8);
        // Drain b's join announcement from a
        let _ = a_rx.try_recv();

        assert_eq!(hub.broadcast_to_all(&left("x")), 2);
        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());

        assert_eq!(hub.broadcast_except(a, &left("y")), 1);
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_slow_member_does_not_block_others() {
        let mut hub = BroadcastHub::new();
        let (_slow, _slow_rx) = member(&mut hub, 1);
        let (_fast, mut fast_rx) = member(&mut hub, 16);

        for _ in 0..5 {
            hub.broadcast_to_all(&left("x"));
        }

        let mut received = 0;
        while fast_rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 5);
    }

    #[tokio::test]
    async fn test_closed_member_is_skipped() {
        let mut hub = BroadcastHub::new();
        let (_gone, gone_rx) = member(&mut hub, 8);
        let (_live, mut live_rx) = member(&mut hub, 8);
        drop(gone_rx);

        assert_eq!(hub.broadcast_to_all(&left("x")), 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_leave() {
        let mut hub = BroadcastHub::new();
        let (a, _a_rx) = member(&mut hub, 8);
        assert!(hub.leave(a));
        assert!(!hub.leave(a));
        assert!(!hub.contains(a));
        assert!(!hub.send_to(a, left("x")));
    }
}
