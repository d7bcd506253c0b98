//! Lookup table from endpoint pairs and connection ids to sessions.

use std::collections::HashMap;

use log::{debug, warn};

use super::{ConnectionId, Session, SessionId, SessionInfo};
use crate::endpoint::EndpointPair;

/// Owns every session of a dispatcher.
///
/// Sessions are indexed by the endpoint pair of the datagram that created
/// them and, once the transport assigns one, by connection id. A datagram
/// carrying a known connection id from a new endpoint pair moves the
/// session to that pair.
pub struct SessionTable<S> {
    sessions: HashMap<SessionId, Session<S>>,
    by_endpoints: HashMap<EndpointPair, SessionId>,
    by_connection_id: HashMap<ConnectionId, SessionId>,
    next_id: u64,
}

impl<S> Default for SessionTable<S> {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
            by_endpoints: HashMap::new(),
            by_connection_id: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<S> SessionTable<S> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize { self.sessions.len() }

    /// Returns `true` if no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.sessions.is_empty() }

    /// Session currently reachable through `endpoints`.
    #[must_use]
    pub fn session_for(&self, endpoints: &EndpointPair) -> Option<SessionId> {
        self.by_endpoints.get(endpoints).copied()
    }

    /// Session indexed under `connection_id`.
    #[must_use]
    pub fn session_for_connection_id(&self, connection_id: ConnectionId) -> Option<SessionId> {
        self.by_connection_id.get(&connection_id).copied()
    }

    /// Borrow a session.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<&Session<S>> { self.sessions.get(&id) }

    pub(crate) fn get_mut(&mut self, id: SessionId) -> Option<&mut Session<S>> {
        self.sessions.get_mut(&id)
    }

    /// Ids of every live session in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Session<S>> { self.sessions.values() }

    /// Find the session for a datagram, migrating it when a known
    /// connection id arrives from an endpoint pair no session owns.
    pub(crate) fn lookup(
        &mut self,
        endpoints: &EndpointPair,
        connection_id: Option<ConnectionId>,
    ) -> Option<SessionId> {
        if let Some(id) = self.session_for(endpoints) {
            return Some(id);
        }
        let id = self.session_for_connection_id(connection_id?)?;
        let session = self.sessions.get_mut(&id)?;
        let previous = session.info().endpoints;
        if self.by_endpoints.get(&previous) == Some(&id) {
            self.by_endpoints.remove(&previous);
        }
        session.migrate(*endpoints);
        self.by_endpoints.insert(*endpoints, id);
        Some(id)
    }

    /// Insert the session built by `build` under `endpoints`.
    pub(crate) fn insert_with(
        &mut self,
        endpoints: EndpointPair,
        build: impl FnOnce(SessionInfo) -> Session<S>,
    ) -> SessionId {
        let id = SessionId::new(self.next_id);
        self.next_id += 1;
        let session = build(SessionInfo {
            id,
            endpoints,
            connection_id: None,
        });
        self.sessions.insert(id, session);
        self.by_endpoints.insert(endpoints, id);
        id
    }

    /// Index the connection id `id`'s transport assigned, if any.
    ///
    /// An id the session held before is dropped from the index. An id
    /// already owned by another live session stays with that session.
    pub(crate) fn index_connection_id(&mut self, id: SessionId) {
        let Some(connection_id) = self.sessions.get(&id).and_then(|s| s.info().connection_id)
        else {
            return;
        };
        self.by_connection_id
            .retain(|cid, owner| *owner != id || *cid == connection_id);
        match self.by_connection_id.get(&connection_id) {
            Some(owner) if *owner == id => {}
            Some(owner) => warn!(
                "connection id already in use: connection_id={connection_id}, owner={owner}, \
                 id={id}"
            ),
            None => {
                self.by_connection_id.insert(connection_id, id);
            }
        }
    }

    /// Remove a session and every index entry pointing at it.
    pub(crate) fn remove(&mut self, id: SessionId) -> Option<Session<S>> {
        let session = self.sessions.remove(&id)?;
        self.by_endpoints.retain(|_, session_id| *session_id != id);
        self.by_connection_id.retain(|_, session_id| *session_id != id);
        Some(session)
    }

    /// Drop closed sessions whose queued datagrams were written. Returns the
    /// ids removed.
    pub(crate) fn reap_closed(&mut self) -> Vec<SessionId> {
        let closed: Vec<_> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_reapable())
            .map(|(id, _)| *id)
            .collect();
        for id in &closed {
            debug!("reaping closed session: id={id}");
            self.remove(*id);
        }
        closed
    }
}
