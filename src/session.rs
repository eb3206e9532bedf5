//! Logged-in sessions and the table that owns them
//!
//! `SessionTable` is the authoritative nickname -> session mapping and keeps
//! the per-origin nickname sets in step with it. It is owned by the
//! `ChatServer` actor, so every check-then-insert happens without
//! interleaving.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;

use indexmap::IndexMap;
use tokio::time::Instant;

use crate::error::AppError;
use crate::types::{unix_millis, ConnectionId, Nickname};
use crate::validation::validate_nickname;

/// Live state of one logged-in chat identity
#[derive(Debug)]
pub struct Session {
    /// Unique among active sessions, fixed for the session's lifetime
    pub nickname: Nickname,
    /// Transport connection that owns this session
    pub connection_id: ConnectionId,
    /// Peer IP of that connection
    pub origin: IpAddr,
    /// Login time (Unix millis)
    pub joined_at: u64,
    /// Currently typing flag
    pub is_typing: bool,
    /// Send times inside the trailing rate-limit window, oldest first
    pub recent_messages: VecDeque<Instant>,
}

impl Session {
    pub(crate) fn new(nickname: Nickname, connection_id: ConnectionId, origin: IpAddr) -> Self {
        Self {
            nickname,
            connection_id,
            origin,
            joined_at: unix_millis(),
            is_typing: false,
            recent_messages: VecDeque::new(),
        }
    }
}

/// Result of a successful login
#[derive(Debug)]
pub struct LoginOutcome {
    /// The nickname now registered for the connection
    pub nickname: Nickname,
    /// Session previously held by the same connection, already removed
    pub replaced: Option<Session>,
}

/// Nickname -> session table with origin bookkeeping
#[derive(Debug)]
pub struct SessionTable {
    /// Sessions in login order
    sessions: IndexMap<Nickname, Session>,
    /// Connection -> nickname, for re-login and disconnect
    by_connection: HashMap<ConnectionId, Nickname>,
    /// Origin -> nicknames currently logged in from it
    origins: HashMap<IpAddr, HashSet<Nickname>>,
    max_nick_length: usize,
    banned: HashSet<String>,
}

impl SessionTable {
    pub fn new(max_nick_length: usize, banned: HashSet<String>) -> Self {
        Self {
            sessions: IndexMap::new(),
            by_connection: HashMap::new(),
            origins: HashMap::new(),
            max_nick_length,
            banned,
        }
    }

    /// Register `requested` for `connection_id`.
    ///
    /// Rejects invalid, banned, or taken nicknames; a rejected login leaves
    /// any existing session of the connection untouched. If the connection
    /// already holds a session it is logged out first and returned in
    /// `LoginOutcome::replaced`; its rate-limit window carries over to the
    /// new session. Re-login under the same nickname is allowed.
    pub fn login(
        &mut self,
        connection_id: ConnectionId,
        origin: IpAddr,
        requested: &str,
    ) -> Result<LoginOutcome, AppError> {
        let nickname = validate_nickname(requested, self.max_nick_length)?;

        if self.banned.contains(nickname.as_str()) {
            return Err(AppError::NicknameBanned(nickname.to_string()));
        }

        if let Some(holder) = self.sessions.get(nickname.as_str()) {
            if holder.connection_id != connection_id {
                return Err(AppError::NicknameTaken(nickname.to_string()));
            }
        }

        let mut replaced = match self.by_connection.get(&connection_id).cloned() {
            Some(previous) => self.logout(previous.as_str()),
            None => None,
        };

        let mut session = Session::new(nickname.clone(), connection_id, origin);
        // The rate-limit window belongs to the connection, not the nickname
        if let Some(previous) = replaced.as_mut() {
            session.recent_messages = std::mem::take(&mut previous.recent_messages);
        }

        self.origins
            .entry(origin)
            .or_default()
            .insert(nickname.clone());
        self.by_connection.insert(connection_id, nickname.clone());
        self.sessions.insert(nickname.clone(), session);

        Ok(LoginOutcome { nickname, replaced })
    }

    /// Remove a session. Removing an absent nickname is a no-op.
    ///
    /// Empty origin sets are dropped along with their last nickname.
    pub fn logout(&mut self, nickname: &str) -> Option<Session> {
        let session = self.sessions.shift_remove(nickname)?;
        self.by_connection.remove(&session.connection_id);

        if let Some(nicks) = self.origins.get_mut(&session.origin) {
            nicks.remove(nickname);
            if nicks.is_empty() {
                self.origins.remove(&session.origin);
            }
        }

        Some(session)
    }

    /// Remove whatever session `connection_id` holds
    pub fn logout_connection(&mut self, connection_id: ConnectionId) -> Option<Session> {
        let nickname = self.by_connection.get(&connection_id)?.clone();
        self.logout(nickname.as_str())
    }

    pub fn get(&self, nickname: &str) -> Option<&Session> {
        self.sessions.get(nickname)
    }

    /// Session held by a connection, if it has logged in
    pub fn by_connection_mut(&mut self, connection_id: ConnectionId) -> Option<&mut Session> {
        let nickname = self.by_connection.get(&connection_id)?;
        self.sessions.get_mut(nickname.as_str())
    }

    /// Nicknames in login order
    pub fn list_nicknames(&self) -> Vec<Nickname> {
        self.sessions.keys().cloned().collect()
    }

    /// (nickname, origin) pairs in login order
    pub fn members(&self) -> Vec<(Nickname, IpAddr)> {
        self.sessions
            .values()
            .map(|s| (s.nickname.clone(), s.origin))
            .collect()
    }

    pub fn origin_nicknames(&self, origin: IpAddr) -> Option<&HashSet<Nickname>> {
        self.origins.get(&origin)
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    /// Remove every session, in login order
    pub fn drain(&mut self) -> Vec<Session> {
        self.by_connection.clear();
        self.origins.clear();
        self.sessions.drain(..).map(|(_, session)| session).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    fn table() -> SessionTable {
        SessionTable::new(20, HashSet::new())
    }

    #[test]
    fn test_login_and_list() {
        let mut table = table();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());

        table.login(a, ip(1), "alice").unwrap();
        table.login(b, ip(2), " bob ").unwrap();

        let names: Vec<String> = table.list_nicknames().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert_eq!(table.get("bob").unwrap().connection_id, b);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut table = table();
        table.login(ConnectionId::new(), ip(1), "alice").unwrap();

        let err = table.login(ConnectionId::new(), ip(2), "alice").unwrap_err();
        assert!(matches!(err, AppError::NicknameTaken(n) if n == "alice"));
        assert_eq!(table.len(), 1);
        assert!(table.origin_nicknames(ip(2)).is_none());
    }

    #[test]
    fn test_nickname_case_sensitive() {
        let mut table = table();
        table.login(ConnectionId::new(), ip(1), "alice").unwrap();
        assert!(table.login(ConnectionId::new(), ip(1), "Alice").is_ok());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_relogin_replaces_session() {
        let mut table = table();
        let conn = ConnectionId::new();

        table.login(conn, ip(1), "alice").unwrap();
        let outcome = table.login(conn, ip(1), "alice").unwrap();
        assert_eq!(outcome.replaced.unwrap().nickname.as_str(), "alice");
        assert_eq!(table.len(), 1);

        let outcome = table.login(conn, ip(1), "alicia").unwrap();
        assert_eq!(outcome.replaced.unwrap().nickname.as_str(), "alice");
        assert!(table.get("alice").is_none());
        assert_eq!(table.origin_nicknames(ip(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_relogin_keeps_rate_window() {
        let mut table = table();
        let conn = ConnectionId::new();
        table.login(conn, ip(1), "alice").unwrap();

        let now = Instant::now();
        let session = table.by_connection_mut(conn).unwrap();
        session.recent_messages.push_back(now);
        session.recent_messages.push_back(now);

        let outcome = table.login(conn, ip(1), "alicia").unwrap();
        assert!(outcome.replaced.unwrap().recent_messages.is_empty());
        assert_eq!(table.get("alicia").unwrap().recent_messages.len(), 2);
    }

    #[test]
    fn test_rejected_relogin_keeps_existing_session() {
        let mut table = table();
        let conn = ConnectionId::new();
        table.login(conn, ip(1), "alice").unwrap();
        table.login(ConnectionId::new(), ip(2), "bob").unwrap();

        assert!(table.login(conn, ip(1), "bob").is_err());
        assert!(matches!(
            table.login(conn, ip(1), ""),
            Err(AppError::Validation(ValidationError::EmptyNickname))
        ));
        assert!(table.get("alice").is_some());
    }

    #[test]
    fn test_banned_nickname() {
        let banned = ["troll".to_string()].into_iter().collect();
        let mut table = SessionTable::new(20, banned);
        let err = table.login(ConnectionId::new(), ip(1), "troll").unwrap_err();
        assert!(matches!(err, AppError::NicknameBanned(_)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_logout_cleans_origin() {
        let mut table = table();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        table.login(a, ip(1), "alice").unwrap();
        table.login(b, ip(1), "bob").unwrap();

        table.logout("alice").unwrap();
        assert_eq!(table.origin_nicknames(ip(1)).unwrap().len(), 1);
        assert!(!table.list_nicknames().iter().any(|n| n.as_str() == "alice"));

        table.logout_connection(b).unwrap();
        assert!(table.origin_nicknames(ip(1)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_logout_idempotent() {
        let mut table = table();
        table.login(ConnectionId::new(), ip(1), "alice").unwrap();
        assert!(table.logout("alice").is_some());
        assert!(table.logout("alice").is_none());
        assert!(table.logout("nobody").is_none());
    }

    #[test]
    fn test_list_order_survives_removal() {
        let mut table = table();
        for nick in ["a", "b", "c", "d"] {
            table.login(ConnectionId::new(), ip(1), nick).unwrap();
        }
        table.logout("b");
        let names: Vec<String> = table.list_nicknames().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_members_reports_origins() {
        let mut table = table();
        table.login(ConnectionId::new(), ip(7), "alice").unwrap();
        let members = table.members();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].1, ip(7));
    }

    #[test]
    fn test_drain() {
        let mut table = table();
        table.login(ConnectionId::new(), ip(1), "alice").unwrap();
        table.login(ConnectionId::new(), ip(2), "bob").unwrap();
        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());
        assert!(table.origin_nicknames(ip(1)).is_none());
    }
}
