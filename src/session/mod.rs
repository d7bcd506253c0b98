//! Per-connection sessions and the table that owns them.
//!
//! A [`Session`] drives one connection's transport, demultiplexes its
//! streams into [`ServerStream`]s and writes the transport's outbound
//! datagrams through the dispatcher's shared [`WriteBridge`]. While the
//! bridge is blocked a session queues datagrams and reports
//! [`FlushOutcome::Blocked`] so the dispatcher can resume it later.

mod guard;
mod table;

use std::{
    cell::RefCell,
    collections::{BTreeMap, VecDeque},
    fmt,
    rc::Rc,
    time::Instant,
};

use bytes::Bytes;
use log::{debug, warn};
use tokio::sync::oneshot::error::TryRecvError;

pub use self::table::SessionTable;
use self::guard::ActiveSession;
use crate::{
    config::DispatcherConfig,
    endpoint::EndpointPair,
    headers::HeaderBlockDecoder,
    helper::ConnectionHelper,
    metrics,
    processor::{ProcessorFactory, StreamId, StreamResponder},
    sequencer::SequencerError,
    stream::ServerStream,
    transport::{ConnectionTransport, TransportEvent},
    writer::{DatagramSink, WriteBridge, WriteCompletion, WriteResult, write_completion},
};

/// Identifier the dispatcher assigns to a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new [`SessionId`] with the provided value.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub const fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "SessionId({})", self.0) }
}

/// Connection id chosen by the transport once a connection is established.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub const fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({:016x})", self.0)
    }
}

/// Identity and addressing of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    /// Dispatcher-assigned id.
    pub id: SessionId,
    /// Endpoints the session currently talks over.
    pub endpoints: EndpointPair,
    /// Transport connection id, once assigned.
    pub connection_id: Option<ConnectionId>,
}

/// Whether a session wrote everything it had queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing is left to write.
    Drained,
    /// The shared writer blocked; the session must be resumed once it
    /// accepts writes again.
    Blocked,
}

/// Collaborators shared by every session of one dispatcher.
pub(crate) struct SessionResources<S> {
    pub writer: Rc<RefCell<WriteBridge<S>>>,
    pub processors: Rc<dyn ProcessorFactory>,
    pub decoder: Rc<dyn HeaderBlockDecoder>,
    pub helper: Rc<ConnectionHelper>,
}

impl<S> Clone for SessionResources<S> {
    fn clone(&self) -> Self {
        Self {
            writer: Rc::clone(&self.writer),
            processors: Rc::clone(&self.processors),
            decoder: Rc::clone(&self.decoder),
            helper: Rc::clone(&self.helper),
        }
    }
}

/// State of one logical connection.
pub struct Session<S> {
    info: SessionInfo,
    streams: BTreeMap<StreamId, ServerStream>,
    transport: Box<dyn ConnectionTransport>,
    resources: SessionResources<S>,
    stream_window: u64,
    max_streams: usize,
    queued: VecDeque<Bytes>,
    inflight: Option<WriteCompletion>,
    highest_stream_id: Option<StreamId>,
    closed: bool,
    _active: ActiveSession,
}

impl<S> Session<S> {
    pub(crate) fn new(
        info: SessionInfo,
        transport: Box<dyn ConnectionTransport>,
        resources: SessionResources<S>,
        config: &DispatcherConfig,
    ) -> Self {
        debug!(
            "session created: id={}, endpoints={}",
            info.id, info.endpoints
        );
        Self {
            info,
            streams: BTreeMap::new(),
            transport,
            resources,
            stream_window: config.initial_stream_flow_control_window,
            max_streams: config.max_streams_per_session,
            queued: VecDeque::new(),
            inflight: None,
            highest_stream_id: None,
            closed: false,
            _active: ActiveSession::new(),
        }
    }

    /// Identity and addressing.
    #[must_use]
    pub fn info(&self) -> &SessionInfo { &self.info }

    /// Returns `true` once the transport reported the connection closed.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed }

    /// Number of live streams.
    #[must_use]
    pub fn stream_count(&self) -> usize { self.streams.len() }

    /// Returns `true` if `stream_id` is live.
    #[must_use]
    pub fn has_stream(&self, stream_id: StreamId) -> bool { self.streams.contains_key(&stream_id) }

    /// Datagrams waiting for the writer.
    #[must_use]
    pub fn queued_datagrams(&self) -> usize { self.queued.len() }

    pub(crate) fn is_reapable(&self) -> bool { self.closed && self.queued.is_empty() }

    pub(crate) fn next_timeout(&self) -> Option<Instant> {
        if self.closed {
            return None;
        }
        self.transport.next_timeout()
    }

    pub(crate) fn migrate(&mut self, endpoints: EndpointPair) {
        debug!(
            "session migrated: id={}, from={}, to={endpoints}",
            self.info.id, self.info.endpoints
        );
        self.info.endpoints = endpoints;
    }

    /// Run `f` with the response entry points of `stream_id`.
    ///
    /// Returns `None` if the stream is not live.
    pub(crate) fn with_responder<R>(
        &mut self,
        stream_id: StreamId,
        f: impl FnOnce(&mut StreamResponder<'_>) -> R,
    ) -> Option<R> {
        let stream = self.streams.get(&stream_id)?;
        let mut responder = stream.responder(self.transport.as_mut());
        Some(f(&mut responder))
    }

    fn handle_events(&mut self, events: Vec<TransportEvent>) {
        for event in events {
            if self.closed {
                break;
            }
            match event {
                TransportEvent::StreamHeaders {
                    stream_id,
                    block,
                    fin,
                } => {
                    if !self.ensure_stream(stream_id) {
                        continue;
                    }
                    if let Some(stream) = self.streams.get_mut(&stream_id) {
                        let result = stream.on_headers(
                            &block,
                            fin,
                            self.resources.decoder.as_ref(),
                            self.transport.as_mut(),
                        );
                        self.check_stream(stream_id, result);
                    }
                }
                TransportEvent::StreamData {
                    stream_id,
                    offset,
                    data,
                    fin,
                } => {
                    if !self.ensure_stream(stream_id) {
                        continue;
                    }
                    if let Some(stream) = self.streams.get_mut(&stream_id) {
                        let result = stream.on_data(offset, data, fin, self.transport.as_mut());
                        self.check_stream(stream_id, result);
                    }
                }
                TransportEvent::StreamClosed { stream_id } => {
                    self.streams.remove(&stream_id);
                }
                TransportEvent::ConnectionIdAssigned(connection_id) => {
                    debug!(
                        "connection id assigned: id={}, connection_id={connection_id}",
                        self.info.id
                    );
                    self.info.connection_id = Some(connection_id);
                }
                TransportEvent::ConnectionClosed { reason } => {
                    debug!("connection closed: id={}, reason={reason}", self.info.id);
                    self.closed = true;
                    self.streams.clear();
                }
            }
        }
    }

    /// Make sure a stream exists for `stream_id`, opening it if the id is
    /// new. Returns `false` if frames for the id must be dropped.
    fn ensure_stream(&mut self, stream_id: StreamId) -> bool {
        if self.streams.contains_key(&stream_id) {
            return true;
        }
        if self.highest_stream_id.is_some_and(|highest| stream_id <= highest) {
            debug!(
                "ignoring frame for finished stream: id={}, stream_id={stream_id}",
                self.info.id
            );
            return false;
        }
        self.highest_stream_id = Some(stream_id);
        if self.streams.len() >= self.max_streams {
            warn!(
                "stream limit reached, resetting stream: id={}, stream_id={stream_id}, limit={}",
                self.info.id, self.max_streams
            );
            self.transport.reset_stream(stream_id);
            return false;
        }
        let processor = self
            .resources
            .processors
            .create_processor(&self.info, stream_id);
        self.streams.insert(
            stream_id,
            ServerStream::new(stream_id, self.stream_window, processor),
        );
        true
    }

    fn check_stream(&mut self, stream_id: StreamId, result: Result<(), SequencerError>) {
        if let Err(e) = result {
            warn!(
                "stream framing error, resetting stream: id={}, stream_id={stream_id}, error={e}",
                self.info.id
            );
            metrics::inc_stream_errors();
            self.transport.reset_stream(stream_id);
            self.streams.remove(&stream_id);
        }
    }

    fn poll_inflight(&mut self) {
        let Some(completion) = self.inflight.as_mut() else {
            return;
        };
        match completion.try_recv() {
            Ok(WriteResult::Error(code)) => {
                self.inflight = None;
                self.transport.on_write_error(code);
            }
            Ok(_) | Err(TryRecvError::Closed) => self.inflight = None,
            Err(TryRecvError::Empty) => {}
        }
    }
}

impl<S: DatagramSink> Session<S> {
    /// Feed an inbound datagram to the transport and write what it produces.
    pub(crate) fn process_packet(&mut self, packet: &[u8]) -> FlushOutcome {
        let now = self.resources.helper.now();
        let mut events = Vec::new();
        self.transport.process_packet(packet, now, &mut events);
        self.handle_events(events);
        self.flush_writes()
    }

    /// The shared writer accepts writes again.
    pub(crate) fn on_can_write(&mut self) -> FlushOutcome {
        self.poll_inflight();
        self.transport.on_can_write();
        self.flush_writes()
    }

    /// Deliver a timer expiry to the transport.
    pub(crate) fn on_alarm(&mut self, now: Instant) -> FlushOutcome {
        let mut events = Vec::new();
        self.transport.on_timeout(now, &mut events);
        self.handle_events(events);
        self.flush_writes()
    }

    /// Move the transport's pending datagrams into the queue and write as
    /// many as the shared writer accepts.
    pub(crate) fn flush_writes(&mut self) -> FlushOutcome {
        self.poll_inflight();
        let now = self.resources.helper.now();
        while let Some(datagram) = self.transport.poll_transmit(now) {
            self.queued.push_back(datagram);
        }

        let EndpointPair { local, peer } = self.info.endpoints;
        while let Some(datagram) = self.queued.front() {
            if self.resources.writer.borrow().is_write_blocked() {
                return FlushOutcome::Blocked;
            }
            let (callback, completion) = write_completion();
            let result = self
                .resources
                .writer
                .borrow_mut()
                .write_with_callback(datagram, &local, &peer, callback);
            match result {
                Ok(WriteResult::Ok(_)) => {
                    self.queued.pop_front();
                }
                Ok(WriteResult::Blocked) => {
                    self.queued.pop_front();
                    self.inflight = Some(completion);
                    return FlushOutcome::Blocked;
                }
                Ok(WriteResult::Error(code)) => {
                    self.queued.pop_front();
                    self.transport.on_write_error(code);
                }
                Err(_) => return FlushOutcome::Blocked,
            }
        }
        FlushOutcome::Drained
    }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        debug!(
            "session removed: id={}, endpoints={}",
            self.info.id, self.info.endpoints
        );
    }
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("streams", &self.streams.len())
            .field("queued", &self.queued.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
