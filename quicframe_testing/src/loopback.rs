//! Plaintext transport for exercising the dispatcher end to end.
//!
//! A datagram is a `bincode`-encoded `Vec<TestFrame>`. Inbound frames map
//! one to one onto transport events; responses written by processors come
//! back out as frames in the next transmitted datagram.

use std::{
    cell::RefCell,
    rc::Rc,
    time::{Duration, Instant},
};

use bincode::{Decode, Encode, config, error::DecodeError};
use bytes::Bytes;
use quicframe::{
    ConnectionId,
    ConnectionTransport,
    StreamId,
    TransportContext,
    TransportEvent,
    TransportFactory,
    headers::{Headers, LengthPrefixedDecoder},
};

/// One unit of a loopback datagram.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum TestFrame {
    /// Keep-alive; answered with a `Ping`.
    Ping,
    /// Connection id the client uses for this connection.
    ConnectionId(u64),
    /// Encoded request header block.
    Headers {
        stream_id: StreamId,
        block: Vec<u8>,
        fin: bool,
    },
    /// Request body bytes.
    Data {
        stream_id: StreamId,
        offset: u64,
        data: Vec<u8>,
        fin: bool,
    },
    /// The client is done with a stream.
    StreamClosed { stream_id: StreamId },
    /// Connection close, in either direction.
    Close { reason: String },
    /// Response headers written by the server.
    ResponseHeaders {
        stream_id: StreamId,
        headers: Vec<(String, String)>,
        fin: bool,
    },
    /// Response body written by the server.
    ResponseData {
        stream_id: StreamId,
        data: Vec<u8>,
        fin: bool,
    },
    /// The server stopped reading a stream.
    CloseReadSide { stream_id: StreamId },
    /// The server reset a stream.
    ResetStream { stream_id: StreamId },
}

/// Encode `frames` as one datagram.
///
/// # Panics
///
/// Panics if `bincode` cannot encode the frames, which does not happen for
/// in-memory buffers.
#[must_use]
pub fn encode_frames(frames: &[TestFrame]) -> Vec<u8> {
    bincode::encode_to_vec(frames, config::standard()).expect("frames encode into a Vec")
}

/// Decode a datagram into its frames.
///
/// # Errors
///
/// Returns the `bincode` error for bytes that are not a frame list.
pub fn decode_frames(datagram: &[u8]) -> Result<Vec<TestFrame>, DecodeError> {
    bincode::decode_from_slice(datagram, config::standard()).map(|(frames, _)| frames)
}

/// Frames carrying a complete request on `stream_id`.
///
/// Headers are encoded with [`LengthPrefixedDecoder::encode`]; a non-empty
/// body follows in one data frame ending the stream.
#[must_use]
pub fn request_frames(stream_id: StreamId, headers: &Headers, body: &[u8]) -> Vec<TestFrame> {
    let mut frames = vec![TestFrame::Headers {
        stream_id,
        block: LengthPrefixedDecoder::encode(headers),
        fin: body.is_empty(),
    }];
    if !body.is_empty() {
        frames.push(TestFrame::Data {
            stream_id,
            offset: 0,
            data: body.to_vec(),
            fin: true,
        });
    }
    frames
}

/// Transport speaking the loopback frame format.
pub struct LoopbackTransport {
    context: TransportContext,
    connection_id: Option<ConnectionId>,
    outbound: Vec<TestFrame>,
    idle_timeout: Option<Duration>,
    last_activity: Instant,
    closed: bool,
    write_errors: Rc<RefCell<Vec<i32>>>,
}

impl LoopbackTransport {
    fn new(
        context: TransportContext,
        idle_timeout: Option<Duration>,
        write_errors: Rc<RefCell<Vec<i32>>>,
    ) -> Self {
        let last_activity = context.helper.now();
        Self {
            context,
            connection_id: None,
            outbound: Vec::new(),
            idle_timeout,
            last_activity,
            closed: false,
            write_errors,
        }
    }

    fn close(&mut self, reason: String, events: &mut Vec<TransportEvent>) {
        self.closed = true;
        events.push(TransportEvent::ConnectionClosed { reason });
    }

    fn handle_frame(&mut self, frame: TestFrame, events: &mut Vec<TransportEvent>) {
        match frame {
            TestFrame::Ping => self.outbound.push(TestFrame::Ping),
            TestFrame::ConnectionId(id) => {
                if self.connection_id.is_none() {
                    let id = ConnectionId::from(id);
                    self.connection_id = Some(id);
                    events.push(TransportEvent::ConnectionIdAssigned(id));
                }
            }
            TestFrame::Headers {
                stream_id,
                block,
                fin,
            } => events.push(TransportEvent::StreamHeaders {
                stream_id,
                block: Bytes::from(block),
                fin,
            }),
            TestFrame::Data {
                stream_id,
                offset,
                data,
                fin,
            } => events.push(TransportEvent::StreamData {
                stream_id,
                offset,
                data: Bytes::from(data),
                fin,
            }),
            TestFrame::StreamClosed { stream_id } => {
                events.push(TransportEvent::StreamClosed { stream_id });
            }
            TestFrame::Close { reason } => self.close(reason, events),
            TestFrame::ResponseHeaders { .. }
            | TestFrame::ResponseData { .. }
            | TestFrame::CloseReadSide { .. }
            | TestFrame::ResetStream { .. } => {}
        }
    }
}

impl ConnectionTransport for LoopbackTransport {
    fn process_packet(&mut self, packet: &[u8], now: Instant, events: &mut Vec<TransportEvent>) {
        if self.closed {
            return;
        }
        self.last_activity = now;
        match decode_frames(packet) {
            Ok(frames) => {
                for frame in frames {
                    if self.closed {
                        break;
                    }
                    self.handle_frame(frame, events);
                }
            }
            Err(e) => self.close(format!("undecodable datagram: {e}"), events),
        }
    }

    fn poll_transmit(&mut self, _now: Instant) -> Option<Bytes> {
        if self.outbound.is_empty() {
            return None;
        }
        let frames = std::mem::take(&mut self.outbound);
        Some(Bytes::from(encode_frames(&frames)))
    }

    fn write_headers(&mut self, stream_id: StreamId, headers: &Headers, fin: bool) {
        self.outbound.push(TestFrame::ResponseHeaders {
            stream_id,
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
            fin,
        });
    }

    fn write_or_buffer_data(&mut self, stream_id: StreamId, data: &[u8], fin: bool) {
        self.outbound.push(TestFrame::ResponseData {
            stream_id,
            data: data.to_vec(),
            fin,
        });
    }

    fn close_read_side(&mut self, stream_id: StreamId) {
        self.outbound.push(TestFrame::CloseReadSide { stream_id });
    }

    fn reset_stream(&mut self, stream_id: StreamId) {
        self.outbound.push(TestFrame::ResetStream { stream_id });
    }

    fn next_timeout(&self) -> Option<Instant> {
        if self.closed {
            return None;
        }
        self.idle_timeout.map(|timeout| self.last_activity + timeout)
    }

    fn on_timeout(&mut self, now: Instant, events: &mut Vec<TransportEvent>) {
        if self.next_timeout().is_some_and(|deadline| deadline <= now) {
            self.close("idle timeout".to_owned(), events);
        }
    }

    fn on_write_error(&mut self, code: i32) { self.write_errors.borrow_mut().push(code); }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("endpoints", &self.context.endpoints)
            .field("connection_id", &self.connection_id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Creates [`LoopbackTransport`]s and records what they were given.
///
/// Clones share the recorded contexts and write errors.
#[derive(Clone, Debug, Default)]
pub struct LoopbackFactory {
    idle_timeout: Option<Duration>,
    contexts: Rc<RefCell<Vec<TransportContext>>>,
    write_errors: Rc<RefCell<Vec<i32>>>,
}

impl LoopbackFactory {
    /// Close connections that stay silent for `timeout`.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Contexts of every transport created, in creation order.
    #[must_use]
    pub fn contexts(&self) -> Vec<TransportContext> { self.contexts.borrow().clone() }

    /// Write error codes reported to any transport.
    #[must_use]
    pub fn write_errors(&self) -> Vec<i32> { self.write_errors.borrow().clone() }
}

impl TransportFactory for LoopbackFactory {
    fn new_transport(&self, context: TransportContext) -> Box<dyn ConnectionTransport> {
        self.contexts.borrow_mut().push(context.clone());
        Box::new(LoopbackTransport::new(
            context,
            self.idle_timeout,
            Rc::clone(&self.write_errors),
        ))
    }

    fn connection_id(&self, packet: &[u8]) -> Option<ConnectionId> {
        decode_frames(packet).ok()?.into_iter().find_map(|frame| match frame {
            TestFrame::ConnectionId(id) => Some(ConnectionId::from(id)),
            _ => None,
        })
    }

    fn accept_initial(&self, packet: &[u8]) -> bool {
        decode_frames(packet).is_ok_and(|frames| !frames.is_empty())
    }
}
