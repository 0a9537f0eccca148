use crate::service::{SessionId, WallClockMillis};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// OPEN until expired or closed. Both are terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Open,
    Expired,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub client: String,
    pub timeout_millis: u64,
    /// Wall clock of the last entry that kept the session alive.
    pub last_updated: WallClockMillis,
    pub state: SessionState,
}

impl Session {
    pub fn new(id: SessionId, client: String, timeout_millis: u64, opened_at: WallClockMillis) -> Self {
        Session {
            id,
            client,
            timeout_millis,
            last_updated: opened_at,
            state: SessionState::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    fn is_timed_out(&self, wall_clock: WallClockMillis) -> bool {
        wall_clock.saturating_sub(self.last_updated) > self.timeout_millis as i64
    }
}

/// An event a primitive published to one of its sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub service: String,
    pub event_type: String,
    pub payload: Bytes,
}

/// SessionRegistry tracks the sessions of one service instance.
///
/// Sessions are ordered by id so that every replica expires them in the same order.
pub struct SessionRegistry {
    service: String,
    sessions: BTreeMap<SessionId, Session>,
    outbox: Vec<SessionEvent>,
}

impl SessionRegistry {
    pub fn new(service: &str) -> Self {
        SessionRegistry {
            service: service.to_string(),
            sessions: BTreeMap::new(),
            outbox: Vec::new(),
        }
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn is_open(&self, id: SessionId) -> bool {
        self.sessions.get(&id).map(Session::is_open).unwrap_or(false)
    }

    /// Open sessions, by id.
    pub fn open_sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values().filter(|session| session.is_open())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Makes a registered session visible as OPEN.
    pub(crate) fn insert(&mut self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    /// Returns false if the session isn't open.
    pub(crate) fn touch(&mut self, id: SessionId, wall_clock: WallClockMillis) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) if session.is_open() => {
                session.last_updated = session.last_updated.max(wall_clock);
                true
            }
            _ => false,
        }
    }

    /// Moves an open session to a terminal state. Returns `None` if it wasn't open, in which case
    /// nothing changed.
    pub(crate) fn terminate(&mut self, id: SessionId, state: SessionState) -> Option<Session> {
        match self.sessions.get_mut(&id) {
            Some(session) if session.is_open() => {
                session.state = state;
                Some(session.clone())
            }
            _ => None,
        }
    }

    pub(crate) fn remove(&mut self, id: SessionId) {
        self.sessions.remove(&id);
    }

    pub(crate) fn timed_out(&self, wall_clock: WallClockMillis) -> Vec<SessionId> {
        self.open_sessions()
            .filter(|session| session.is_timed_out(wall_clock))
            .map(|session| session.id)
            .collect()
    }

    /// Publishing to a session that isn't open is a no-op.
    pub fn publish(&mut self, id: SessionId, event_type: &str, payload: Bytes) {
        if !self.is_open(id) {
            return;
        }
        self.outbox.push(SessionEvent {
            session: id,
            service: self.service.clone(),
            event_type: event_type.to_string(),
            payload,
        });
    }

    pub(crate) fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn records(&self) -> Vec<Session> {
        self.sessions.values().cloned().collect()
    }

    pub(crate) fn restore(&mut self, sessions: Vec<Session>) {
        self.outbox.clear();
        self.sessions = sessions
            .into_iter()
            .filter(Session::is_open)
            .map(|session| (session.id, session))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(id: u64, timeout_millis: u64) -> SessionRegistry {
        let mut registry = SessionRegistry::new("map-1");
        registry.insert(Session::new(SessionId::new(id), "client".to_string(), timeout_millis, 0));
        registry
    }

    #[test]
    fn timeout_is_measured_from_last_update() {
        let mut registry = registry_with(3, 1000);
        assert!(registry.timed_out(1000).is_empty());
        assert_eq!(registry.timed_out(1001), vec![SessionId::new(3)]);

        assert!(registry.touch(SessionId::new(3), 900));
        assert!(registry.timed_out(1900).is_empty());
        // The wall clock never moves a session backwards.
        assert!(registry.touch(SessionId::new(3), 100));
        assert_eq!(registry.get(SessionId::new(3)).unwrap().last_updated, 900);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut registry = registry_with(3, 1000);
        let expired = registry.terminate(SessionId::new(3), SessionState::Expired).unwrap();
        assert_eq!(expired.state, SessionState::Expired);

        assert_eq!(registry.terminate(SessionId::new(3), SessionState::Closed), None);
        assert!(!registry.touch(SessionId::new(3), 10));
        assert_eq!(registry.get(SessionId::new(3)).unwrap().state, SessionState::Expired);
    }

    #[test]
    fn publishing_requires_an_open_session() {
        let mut registry = registry_with(3, 1000);
        registry.publish(SessionId::new(3), "changed", Bytes::from_static(b"a"));
        registry.publish(SessionId::new(4), "changed", Bytes::from_static(b"b"));
        registry.terminate(SessionId::new(3), SessionState::Closed);
        registry.publish(SessionId::new(3), "changed", Bytes::from_static(b"c"));

        let events = registry.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].service, "map-1");
        assert_eq!(events[0].payload, Bytes::from_static(b"a"));
        assert!(registry.take_events().is_empty());
    }
}
