//! Seam to the connection-level transport a session runs on.
//!
//! Packet protection, loss recovery and the wire encoding of frames live
//! below this crate. A session drives its transport sans-io: it feeds
//! inbound datagrams in, drains [`TransportEvent`]s describing stream
//! activity, and polls outbound datagrams which it then writes through the
//! shared write bridge.

use std::{rc::Rc, time::Instant};

use bytes::Bytes;

use crate::{
    config::DispatcherConfig,
    endpoint::EndpointPair,
    headers::Headers,
    helper::ConnectionHelper,
    processor::StreamId,
    session::ConnectionId,
};

/// Stream and connection activity reported by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A stream's encoded header block arrived. `fin` marks a request with
    /// no body.
    StreamHeaders {
        /// Stream the block belongs to.
        stream_id: StreamId,
        /// Encoded header block.
        block: Bytes,
        /// The stream ends with the header block.
        fin: bool,
    },
    /// Body bytes for a stream at the given offset.
    StreamData {
        /// Stream the data belongs to.
        stream_id: StreamId,
        /// Offset of `data` within the stream body.
        offset: u64,
        /// Payload bytes.
        data: Bytes,
        /// `data` ends the stream.
        fin: bool,
    },
    /// The transport finished with a stream; it is destroyed.
    StreamClosed {
        /// Stream that closed.
        stream_id: StreamId,
    },
    /// The transport chose a connection id for this session.
    ConnectionIdAssigned(ConnectionId),
    /// The connection closed. No further events follow.
    ConnectionClosed {
        /// Human-readable close reason.
        reason: String,
    },
}

/// Connection-level transport driven by one session.
pub trait ConnectionTransport {
    /// Process an inbound datagram, appending resulting events.
    fn process_packet(&mut self, packet: &[u8], now: Instant, events: &mut Vec<TransportEvent>);

    /// Next datagram ready for transmission.
    fn poll_transmit(&mut self, now: Instant) -> Option<Bytes>;

    /// Queue response headers on a stream.
    fn write_headers(&mut self, stream_id: StreamId, headers: &Headers, fin: bool);

    /// Queue response body bytes on a stream.
    fn write_or_buffer_data(&mut self, stream_id: StreamId, data: &[u8], fin: bool);

    /// Stop accepting inbound data on a stream.
    fn close_read_side(&mut self, stream_id: StreamId);

    /// Abort a stream in both directions.
    fn reset_stream(&mut self, stream_id: StreamId);

    /// Earliest instant at which [`on_timeout`](Self::on_timeout) must run.
    fn next_timeout(&self) -> Option<Instant>;

    /// A timer deadline passed.
    fn on_timeout(&mut self, now: Instant, events: &mut Vec<TransportEvent>);

    /// A datagram written for this connection failed with `code`.
    fn on_write_error(&mut self, code: i32) { let _ = code; }

    /// The shared writer accepted writes again.
    fn on_can_write(&mut self) {}
}

/// Everything a transport receives when its session is created.
#[derive(Clone, Debug)]
pub struct TransportContext {
    /// Dispatcher configuration, server defaults applied.
    pub config: DispatcherConfig,
    /// Clock and random source shared with the dispatcher.
    pub helper: Rc<ConnectionHelper>,
    /// Endpoints of the first datagram.
    pub endpoints: EndpointPair,
    /// Largest datagram the writer accepts for this peer.
    pub max_packet_size: usize,
}

/// Creates transports for new sessions and inspects datagrams before a
/// session exists.
pub trait TransportFactory {
    /// Build the transport for a new session.
    fn new_transport(&self, context: TransportContext) -> Box<dyn ConnectionTransport>;

    /// Connection id carried by `packet`, if the format exposes one.
    fn connection_id(&self, packet: &[u8]) -> Option<ConnectionId> {
        let _ = packet;
        None
    }

    /// Whether `packet` from an unknown peer may open a session.
    fn accept_initial(&self, packet: &[u8]) -> bool {
        let _ = packet;
        true
    }
}

impl<F> TransportFactory for F
where
    F: Fn(TransportContext) -> Box<dyn ConnectionTransport>,
{
    fn new_transport(&self, context: TransportContext) -> Box<dyn ConnectionTransport> { self(context) }
}
