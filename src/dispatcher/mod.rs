//! Entry point routing inbound datagrams to sessions.
//!
//! [`PacketDispatcher`] owns the session table, the single write bridge all
//! sessions share, and the helper supplying time and randomness. It is
//! single-threaded: every entry point runs to completion on the caller's
//! thread and never blocks.
//!
//! Because one bridge serves all sessions, a write that blocks stalls every
//! session's outbound datagrams. Sessions that could not write join a FIFO
//! write-blocked list which [`PacketDispatcher::on_write_complete`] drains.

mod builder;

use std::{cell::RefCell, collections::VecDeque, rc::Rc, time::Instant};

use log::debug;

pub use self::builder::DispatcherBuilder;
use crate::{
    config::DispatcherConfig,
    endpoint::{Endpoint, EndpointPair},
    metrics,
    processor::{ProcessorFactory, StreamId, StreamResponder},
    session::{FlushOutcome, Session, SessionId, SessionInfo, SessionResources, SessionTable},
    transport::{TransportContext, TransportFactory},
    writer::{DatagramSink, WriteBridge, WriteBridgeError, WriteResult},
};

/// Routes datagrams to sessions and arbitrates their writes.
///
/// # Examples
///
/// ```
/// use std::time::Instant;
///
/// use bytes::Bytes;
/// use quicframe::{
///     dispatcher::PacketDispatcher,
///     endpoint::Endpoint,
///     headers::Headers,
///     processor::{RequestProcessor, StreamId, StreamResponder},
///     session::SessionInfo,
///     transport::{ConnectionTransport, TransportContext, TransportEvent},
///     writer::{DatagramSink, SinkStatus},
/// };
///
/// struct Discard;
///
/// impl DatagramSink for Discard {
///     fn send(&mut self, _to: &Endpoint, datagram: &[u8]) -> SinkStatus {
///         SinkStatus::Sent(datagram.len())
///     }
/// }
///
/// struct Silent;
///
/// impl ConnectionTransport for Silent {
///     fn process_packet(&mut self, _: &[u8], _: Instant, _: &mut Vec<TransportEvent>) {}
///     fn poll_transmit(&mut self, _: Instant) -> Option<Bytes> { None }
///     fn write_headers(&mut self, _: StreamId, _: &Headers, _: bool) {}
///     fn write_or_buffer_data(&mut self, _: StreamId, _: &[u8], _: bool) {}
///     fn close_read_side(&mut self, _: StreamId) {}
///     fn reset_stream(&mut self, _: StreamId) {}
///     fn next_timeout(&self) -> Option<Instant> { None }
///     fn on_timeout(&mut self, _: Instant, _: &mut Vec<TransportEvent>) {}
/// }
///
/// struct Ignore;
///
/// impl RequestProcessor for Ignore {
///     fn on_header(&mut self, _: &str, _: &str) {}
///     fn on_fin(&mut self, _: &mut StreamResponder<'_>) {}
///     fn on_close(&mut self) {}
/// }
///
/// let mut dispatcher = PacketDispatcher::builder(
///     Discard,
///     |_: TransportContext| -> Box<dyn ConnectionTransport> { Box::new(Silent) },
///     |_: &SessionInfo, _: StreamId| -> Box<dyn RequestProcessor> { Box::new(Ignore) },
/// )
/// .build()
/// .expect("default configuration is valid");
///
/// let local = Endpoint::from_octets(&[127, 0, 0, 1], 4433).expect("local");
/// let peer = Endpoint::from_octets(&[127, 0, 0, 1], 50_000).expect("peer");
/// dispatcher.dispatch(&local, &peer, b"initial");
/// dispatcher.dispatch(&local, &peer, b"second");
/// assert_eq!(dispatcher.session_count(), 1);
/// ```
pub struct PacketDispatcher<S> {
    sessions: SessionTable<S>,
    write_blocked: VecDeque<SessionId>,
    transports: Box<dyn TransportFactory>,
    resources: SessionResources<S>,
    config: DispatcherConfig,
}

impl<S: DatagramSink> PacketDispatcher<S> {
    /// Start building a dispatcher writing to `sink`.
    #[must_use]
    pub fn builder(
        sink: S,
        transports: impl TransportFactory + 'static,
        processors: impl ProcessorFactory + 'static,
    ) -> DispatcherBuilder<S> {
        DispatcherBuilder::new(sink, transports, processors)
    }

    /// Route `datagram` to its session, creating one for an unknown peer.
    ///
    /// The datagram is only borrowed for the duration of the call. Failures
    /// below this layer are logged and never surface here.
    pub fn dispatch(&mut self, self_endpoint: &Endpoint, peer_endpoint: &Endpoint, datagram: &[u8]) {
        metrics::inc_packets(metrics::Direction::Inbound);
        let endpoints = EndpointPair::new(*self_endpoint, *peer_endpoint);
        let connection_id = self.transports.connection_id(datagram);

        let id = match self.sessions.lookup(&endpoints, connection_id) {
            Some(id) => id,
            None if self.transports.accept_initial(datagram) => self.create_session(endpoints),
            None => {
                debug!("dropping datagram that cannot open a session: endpoints={endpoints}");
                return;
            }
        };

        if let Some(session) = self.sessions.get_mut(id) {
            let outcome = session.process_packet(datagram);
            self.track(id, outcome);
        }
        self.sessions.index_connection_id(id);
        self.reap_closed();
    }

    fn create_session(&mut self, endpoints: EndpointPair) -> SessionId {
        let context = TransportContext {
            config: self.config.clone(),
            helper: Rc::clone(&self.resources.helper),
            endpoints,
            max_packet_size: self.resources.writer.borrow().max_packet_size(&endpoints.peer),
        };
        let transport = self.transports.new_transport(context);
        let resources = self.resources.clone();
        let config = &self.config;
        self.sessions.insert_with(endpoints, |info| {
            Session::new(info, transport, resources, config)
        })
    }

    /// Report completion of the blocked write with raw status `rv`, then let
    /// write-blocked sessions resume.
    ///
    /// # Errors
    ///
    /// Returns a [`WriteBridgeError`] if no write was pending or `rv` is the
    /// pending status. Blocked sessions are not resumed in that case.
    pub fn on_write_complete(&mut self, rv: i64) -> Result<WriteResult, WriteBridgeError> {
        let result = self.resources.writer.borrow_mut().on_write_complete(rv)?;
        self.on_can_write();
        Ok(result)
    }

    /// Resume write-blocked sessions in the order they blocked until the
    /// writer blocks again.
    pub fn on_can_write(&mut self) {
        while !self.is_write_blocked() {
            let Some(id) = self.write_blocked.pop_front() else {
                break;
            };
            if let Some(session) = self.sessions.get_mut(id) {
                let outcome = session.on_can_write();
                self.track(id, outcome);
            }
        }
        self.reap_closed();
    }

    /// Earliest transport deadline across all sessions.
    #[must_use]
    pub fn next_alarm(&self) -> Option<Instant> {
        self.sessions.iter().filter_map(Session::next_timeout).min()
    }

    /// Deliver a one-shot timeout to every session whose deadline is at or
    /// before `now`.
    pub fn fire_alarms(&mut self, now: Instant) {
        for id in self.sessions.ids() {
            let Some(session) = self.sessions.get_mut(id) else {
                continue;
            };
            if session.next_timeout().is_some_and(|deadline| deadline <= now) {
                let outcome = session.on_alarm(now);
                self.track(id, outcome);
            }
        }
        self.reap_closed();
    }

    /// Run `f` with the response entry points of `stream_id` on `session`,
    /// then write whatever the response produced.
    ///
    /// Returns `None` if the session or stream is gone.
    pub fn with_responder<R>(
        &mut self,
        session: SessionId,
        stream_id: StreamId,
        f: impl FnOnce(&mut StreamResponder<'_>) -> R,
    ) -> Option<R> {
        let target = self.sessions.get_mut(session)?;
        let result = target.with_responder(stream_id, f);
        let outcome = target.flush_writes();
        self.track(session, outcome);
        self.reap_closed();
        result
    }

    fn track(&mut self, id: SessionId, outcome: FlushOutcome) {
        if outcome == FlushOutcome::Blocked && !self.write_blocked.contains(&id) {
            self.write_blocked.push_back(id);
        }
    }

    fn reap_closed(&mut self) {
        let reaped = self.sessions.reap_closed();
        if !reaped.is_empty() {
            self.write_blocked.retain(|id| !reaped.contains(id));
        }
    }

    /// Returns `true` while the shared writer has a write outstanding.
    #[must_use]
    pub fn is_write_blocked(&self) -> bool { self.resources.writer.borrow().is_write_blocked() }

    /// Sessions waiting for the writer, in resume order.
    #[must_use]
    pub fn write_blocked_sessions(&self) -> Vec<SessionId> { self.write_blocked.iter().copied().collect() }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize { self.sessions.len() }

    /// Session currently reachable through the given endpoints.
    #[must_use]
    pub fn session_for(&self, self_endpoint: &Endpoint, peer_endpoint: &Endpoint) -> Option<SessionId> {
        self.sessions
            .session_for(&EndpointPair::new(*self_endpoint, *peer_endpoint))
    }

    /// Identity of a live session.
    #[must_use]
    pub fn session_info(&self, id: SessionId) -> Option<&SessionInfo> {
        self.sessions.get(id).map(Session::info)
    }

    /// The session table.
    #[must_use]
    pub fn sessions(&self) -> &SessionTable<S> { &self.sessions }

    /// Current time according to the dispatcher's clock.
    #[must_use]
    pub fn now(&self) -> Instant { self.resources.helper.now() }

    /// Effective configuration, server defaults applied.
    #[must_use]
    pub fn config(&self) -> &DispatcherConfig { &self.config }

    /// Largest datagram written to `peer`.
    #[must_use]
    pub fn max_packet_size(&self, peer: &Endpoint) -> usize {
        self.resources.writer.borrow().max_packet_size(peer)
    }

    /// The shared write bridge.
    #[must_use]
    pub fn writer(&self) -> &Rc<RefCell<WriteBridge<S>>> { &self.resources.writer }
}
