//! Contract between a stream and the request processor behind it.
//!
//! Each stream owns one [`RequestProcessor`], created by the dispatcher's
//! [`ProcessorFactory`] when the stream is first seen. The processor receives
//! the completed request and answers through a [`StreamResponder`], a thin
//! pass-through to the connection's stream write primitives.

use crate::{headers::Headers, session::SessionInfo, transport::ConnectionTransport};

/// Identifier of a stream, scoped to its session.
pub type StreamId = u64;

/// Consumer of one stream's request.
///
/// For a request that completes, every header pair is delivered through
/// [`on_header`](Self::on_header) in decode order, then the body through
/// [`process_data`](Self::process_data), then [`on_fin`](Self::on_fin).
/// [`on_close`](Self::on_close) runs exactly once when the stream is
/// destroyed, whether or not the request completed.
pub trait RequestProcessor {
    /// Receive one request header.
    fn on_header(&mut self, name: &str, value: &str);

    /// Receive the request body.
    fn process_data(&mut self, body: &[u8]) { let _ = body; }

    /// The request is complete. The responder may be used to answer it.
    fn on_fin(&mut self, responder: &mut StreamResponder<'_>);

    /// The stream was destroyed.
    fn on_close(&mut self);
}

/// Creates a [`RequestProcessor`] for every new stream.
pub trait ProcessorFactory {
    /// Build the processor for `stream_id` on `session`.
    fn create_processor(
        &self,
        session: &SessionInfo,
        stream_id: StreamId,
    ) -> Box<dyn RequestProcessor>;
}

impl<F> ProcessorFactory for F
where
    F: Fn(&SessionInfo, StreamId) -> Box<dyn RequestProcessor>,
{
    fn create_processor(
        &self,
        session: &SessionInfo,
        stream_id: StreamId,
    ) -> Box<dyn RequestProcessor> {
        self(session, stream_id)
    }
}

/// Response emission entry points for one stream.
pub struct StreamResponder<'a> {
    stream_id: StreamId,
    transport: &'a mut dyn ConnectionTransport,
}

impl<'a> StreamResponder<'a> {
    pub(crate) fn new(stream_id: StreamId, transport: &'a mut dyn ConnectionTransport) -> Self {
        Self {
            stream_id,
            transport,
        }
    }

    /// Stream this responder writes to.
    #[must_use]
    pub fn stream_id(&self) -> StreamId { self.stream_id }

    /// Write response headers. `is_empty_body` ends the stream with them.
    pub fn write_headers(&mut self, headers: &Headers, is_empty_body: bool) {
        self.transport
            .write_headers(self.stream_id, headers, is_empty_body);
    }

    /// Write or buffer response body bytes. `is_final` ends the stream.
    pub fn write_or_buffer_body(&mut self, data: &[u8], is_final: bool) {
        self.transport
            .write_or_buffer_data(self.stream_id, data, is_final);
    }

    /// Stop reading from the stream.
    pub fn close_read_side(&mut self) { self.transport.close_read_side(self.stream_id); }
}
