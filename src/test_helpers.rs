//! Shared doubles for unit tests.

use std::{
    cell::RefCell,
    collections::VecDeque,
    net::{IpAddr, Ipv4Addr},
    rc::Rc,
    time::Instant,
};

use bytes::Bytes;

use crate::{
    endpoint::Endpoint,
    headers::Headers,
    processor::{RequestProcessor, StreamId, StreamResponder},
    session::{ConnectionId, SessionInfo},
    transport::{ConnectionTransport, TransportContext, TransportEvent, TransportFactory},
    writer::{DatagramSink, SinkStatus},
};

/// Endpoint the server side listens on.
pub(crate) fn local_endpoint() -> Endpoint {
    Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4433)
}

/// A distinct peer endpoint per `n`.
pub(crate) fn peer_endpoint(n: u16) -> Endpoint {
    Endpoint::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 50_000 + n)
}

#[derive(Debug, Default)]
struct SinkState {
    statuses: VecDeque<SinkStatus>,
    sent: Vec<(Endpoint, Vec<u8>)>,
}

/// Sink returning scripted statuses and recording every datagram it sees.
///
/// Clones share state. With no status scripted a write succeeds in full.
#[derive(Clone, Debug, Default)]
pub(crate) struct ScriptedSink(Rc<RefCell<SinkState>>);

impl ScriptedSink {
    pub(crate) fn push_status(&self, status: SinkStatus) {
        self.0.borrow_mut().statuses.push_back(status);
    }

    pub(crate) fn sent(&self) -> Vec<(Endpoint, Vec<u8>)> { self.0.borrow().sent.clone() }
}

impl DatagramSink for ScriptedSink {
    fn send(&mut self, destination: &Endpoint, datagram: &[u8]) -> SinkStatus {
        let mut state = self.0.borrow_mut();
        state.sent.push((*destination, datagram.to_vec()));
        state
            .statuses
            .pop_front()
            .unwrap_or(SinkStatus::Sent(datagram.len()))
    }
}

/// Stream write issued through a [`ScriptedTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum StreamWrite {
    Headers {
        stream_id: StreamId,
        headers: Headers,
        fin: bool,
    },
    Body {
        stream_id: StreamId,
        data: Vec<u8>,
        fin: bool,
    },
    CloseReadSide(StreamId),
    Reset(StreamId),
}

/// Observable state of a [`ScriptedTransport`].
#[derive(Debug, Default)]
pub(crate) struct TransportState {
    /// Inbound datagrams handed to the transport.
    pub packets: Vec<Vec<u8>>,
    /// Event batches emitted, one per inbound datagram.
    pub scripted: VecDeque<Vec<TransportEvent>>,
    /// Events emitted on the next timeout.
    pub timeout_events: Vec<TransportEvent>,
    /// Datagrams waiting to be polled.
    pub transmits: VecDeque<Bytes>,
    /// Stream writes in call order.
    pub writes: Vec<StreamWrite>,
    /// Codes passed to `on_write_error`.
    pub write_errors: Vec<i32>,
    /// Number of `on_can_write` calls.
    pub can_write_calls: usize,
    /// Deadline reported by `next_timeout`.
    pub deadline: Option<Instant>,
    /// Instants at which `on_timeout` ran.
    pub timeouts: Vec<Instant>,
    /// Context the transport was built with.
    pub context: Option<TransportContext>,
}

pub(crate) type TransportHandle = Rc<RefCell<TransportState>>;

/// Transport whose events and transmissions are scripted by the test.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    state: TransportHandle,
}

impl ScriptedTransport {
    pub(crate) fn handle(&self) -> TransportHandle { Rc::clone(&self.state) }
}

impl ConnectionTransport for ScriptedTransport {
    fn process_packet(&mut self, packet: &[u8], _now: Instant, events: &mut Vec<TransportEvent>) {
        let mut state = self.state.borrow_mut();
        state.packets.push(packet.to_vec());
        if let Some(batch) = state.scripted.pop_front() {
            events.extend(batch);
        }
    }

    fn poll_transmit(&mut self, _now: Instant) -> Option<Bytes> {
        self.state.borrow_mut().transmits.pop_front()
    }

    fn write_headers(&mut self, stream_id: StreamId, headers: &Headers, fin: bool) {
        self.state.borrow_mut().writes.push(StreamWrite::Headers {
            stream_id,
            headers: headers.clone(),
            fin,
        });
    }

    fn write_or_buffer_data(&mut self, stream_id: StreamId, data: &[u8], fin: bool) {
        self.state.borrow_mut().writes.push(StreamWrite::Body {
            stream_id,
            data: data.to_vec(),
            fin,
        });
    }

    fn close_read_side(&mut self, stream_id: StreamId) {
        self.state
            .borrow_mut()
            .writes
            .push(StreamWrite::CloseReadSide(stream_id));
    }

    fn reset_stream(&mut self, stream_id: StreamId) {
        self.state
            .borrow_mut()
            .writes
            .push(StreamWrite::Reset(stream_id));
    }

    fn next_timeout(&self) -> Option<Instant> { self.state.borrow().deadline }

    fn on_timeout(&mut self, now: Instant, events: &mut Vec<TransportEvent>) {
        let mut state = self.state.borrow_mut();
        state.timeouts.push(now);
        state.deadline = None;
        events.append(&mut state.timeout_events);
    }

    fn on_write_error(&mut self, code: i32) { self.state.borrow_mut().write_errors.push(code); }

    fn on_can_write(&mut self) { self.state.borrow_mut().can_write_calls += 1; }
}

/// Marker byte introducing a connection id in test datagrams.
pub(crate) const CID_MARKER: u8 = 0xc0;

/// Test datagram carrying connection id `cid`.
pub(crate) fn cid_packet(cid: u64) -> Vec<u8> {
    let mut packet = vec![CID_MARKER];
    packet.extend_from_slice(&cid.to_be_bytes());
    packet
}

#[derive(Debug, Default)]
struct FactoryState {
    prepared: VecDeque<TransportHandle>,
    created: Vec<TransportHandle>,
}

/// Factory building [`ScriptedTransport`]s.
///
/// Clones share state. Empty datagrams are refused as initial packets and a
/// datagram starting with [`CID_MARKER`] carries a big-endian connection id.
#[derive(Clone, Debug, Default)]
pub(crate) struct ScriptedFactory(Rc<RefCell<FactoryState>>);

impl ScriptedFactory {
    /// State for the next transport built, so its first datagram can be
    /// scripted before the session exists.
    pub(crate) fn prepare(&self) -> TransportHandle {
        let handle = TransportHandle::default();
        self.0
            .borrow_mut()
            .prepared
            .push_back(Rc::clone(&handle));
        handle
    }

    /// Transports created so far, in creation order.
    pub(crate) fn created(&self) -> Vec<TransportHandle> { self.0.borrow().created.clone() }
}

impl TransportFactory for ScriptedFactory {
    fn new_transport(&self, context: TransportContext) -> Box<dyn ConnectionTransport> {
        let mut factory = self.0.borrow_mut();
        let state = factory.prepared.pop_front().unwrap_or_default();
        state.borrow_mut().context = Some(context);
        factory.created.push(Rc::clone(&state));
        Box::new(ScriptedTransport { state })
    }

    fn connection_id(&self, packet: &[u8]) -> Option<ConnectionId> {
        let (&marker, rest) = packet.split_first()?;
        if marker != CID_MARKER {
            return None;
        }
        let raw: [u8; 8] = rest.get(..8)?.try_into().ok()?;
        Some(ConnectionId::new(u64::from_be_bytes(raw)))
    }

    fn accept_initial(&self, packet: &[u8]) -> bool { !packet.is_empty() }
}

/// Processor callback observed by a [`RecordingProcessor`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ProcessorEvent {
    Header(StreamId, String, String),
    Data(StreamId, Vec<u8>),
    Fin(StreamId),
    Close(StreamId),
}

/// Shared log of processor callbacks.
#[derive(Clone, Debug, Default)]
pub(crate) struct ProcessorLog(Rc<RefCell<Vec<ProcessorEvent>>>);

impl ProcessorLog {
    pub(crate) fn events(&self) -> Vec<ProcessorEvent> { self.0.borrow().clone() }

    fn push(&self, event: ProcessorEvent) { self.0.borrow_mut().push(event); }
}

/// Processor recording callbacks and answering each request with a 200
/// echoing its body.
pub(crate) struct RecordingProcessor {
    stream_id: StreamId,
    log: ProcessorLog,
    body: Vec<u8>,
}

impl RecordingProcessor {
    pub(crate) fn new(stream_id: StreamId, log: ProcessorLog) -> Self {
        Self {
            stream_id,
            log,
            body: Vec::new(),
        }
    }

    /// Processor factory recording into `log`.
    pub(crate) fn factory(
        log: ProcessorLog,
    ) -> impl Fn(&SessionInfo, StreamId) -> Box<dyn RequestProcessor> {
        move |_session: &SessionInfo, stream_id: StreamId| -> Box<dyn RequestProcessor> {
            Box::new(RecordingProcessor::new(stream_id, log.clone()))
        }
    }
}

impl RequestProcessor for RecordingProcessor {
    fn on_header(&mut self, name: &str, value: &str) {
        self.log.push(ProcessorEvent::Header(
            self.stream_id,
            name.to_owned(),
            value.to_owned(),
        ));
    }

    fn process_data(&mut self, body: &[u8]) {
        self.body = body.to_vec();
        self.log
            .push(ProcessorEvent::Data(self.stream_id, body.to_vec()));
    }

    fn on_fin(&mut self, responder: &mut StreamResponder<'_>) {
        self.log.push(ProcessorEvent::Fin(self.stream_id));
        let mut headers = Headers::new();
        headers.set(":status", "200");
        responder.write_headers(&headers, self.body.is_empty());
        if !self.body.is_empty() {
            responder.write_or_buffer_body(&self.body, true);
        }
    }

    fn on_close(&mut self) { self.log.push(ProcessorEvent::Close(self.stream_id)); }
}
