//! Per-origin connection capping
//!
//! Consulted in the accept loop, before the WebSocket handshake. Each
//! admitted connection holds a `ConnectionPermit`; dropping the permit
//! releases the slot.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;

/// Caps concurrent transport connections per IP
#[derive(Debug, Clone)]
pub struct ConnectionGuard {
    limit: usize,
    counts: Arc<Mutex<HashMap<IpAddr, usize>>>,
}

impl ConnectionGuard {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reserve a slot for `origin`.
    ///
    /// Returns `None` if the origin already has `limit` open connections;
    /// the caller must then refuse the connection outright.
    pub fn try_admit(&self, origin: IpAddr) -> Option<ConnectionPermit> {
        let mut counts = self.counts.lock();
        let count = counts.entry(origin).or_insert(0);
        if *count >= self.limit {
            if *count == 0 {
                counts.remove(&origin);
            }
            return None;
        }
        *count += 1;

        Some(ConnectionPermit {
            origin,
            counts: Arc::clone(&self.counts),
        })
    }

    /// Open connections from `origin`
    pub fn active(&self, origin: IpAddr) -> usize {
        self.counts.lock().get(&origin).copied().unwrap_or(0)
    }

    /// Number of origins with at least one open connection
    pub fn origins(&self) -> usize {
        self.counts.lock().len()
    }
}

/// An admitted connection's slot; released on drop
#[derive(Debug)]
pub struct ConnectionPermit {
    origin: IpAddr,
    counts: Arc<Mutex<HashMap<IpAddr, usize>>>,
}

impl ConnectionPermit {
    pub fn origin(&self) -> IpAddr {
        self.origin
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(&self.origin) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&self.origin);
            }
        }
    }
}
