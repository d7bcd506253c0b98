//! Server side of one request stream.
//!
//! A [`ServerStream`] ties together the body sequencer, the request
//! assembler and the request processor for a single stream id. Dropping the
//! stream notifies the processor through `on_close`.

use std::fmt;

use bytes::Bytes;
use log::{debug, warn};

use crate::{
    assembler::{AssemblyProgress, AssemblyState, RequestAssembler, RequestError},
    headers::{HeaderBlockDecoder, Headers},
    metrics,
    processor::{RequestProcessor, StreamId, StreamResponder},
    sequencer::{SequencerError, StreamSequencer},
    transport::ConnectionTransport,
};

/// Body of the response sent for a malformed request.
pub const BAD_REQUEST_BODY: &[u8] = b"bad request";

/// Headers of the response sent for a malformed request.
#[must_use]
pub fn bad_request_headers() -> Headers {
    let mut headers = Headers::new();
    headers.set(":status", "400");
    headers.set("content-length", BAD_REQUEST_BODY.len().to_string());
    headers
}

/// Request side of one stream.
pub struct ServerStream {
    id: StreamId,
    sequencer: StreamSequencer,
    assembler: RequestAssembler,
    processor: Box<dyn RequestProcessor>,
}

impl ServerStream {
    /// Create a stream whose body may run `window` bytes ahead of the reader.
    #[must_use]
    pub fn new(id: StreamId, window: u64, processor: Box<dyn RequestProcessor>) -> Self {
        debug!("stream opened: stream_id={id}");
        Self {
            id,
            sequencer: StreamSequencer::new(window),
            assembler: RequestAssembler::new(),
            processor,
        }
    }

    /// Stream id.
    #[must_use]
    pub fn id(&self) -> StreamId { self.id }

    /// Handle the stream's header block.
    ///
    /// # Errors
    ///
    /// Returns a [`SequencerError`] if `fin` contradicts body data already
    /// received. The caller resets the stream.
    ///
    /// A block arriving after the request completed or was rejected is
    /// dropped.
    pub fn on_headers(
        &mut self,
        block: &[u8],
        fin: bool,
        decoder: &dyn HeaderBlockDecoder,
        transport: &mut dyn ConnectionTransport,
    ) -> Result<(), SequencerError> {
        if self.assembler.state() == AssemblyState::Closed {
            debug!("header block on closed stream dropped: stream_id={}", self.id);
            return Ok(());
        }
        if fin {
            self.sequencer.on_frame(0, Bytes::new(), true)?;
        }
        if let Err(e) = self.assembler.on_headers_complete(block, decoder) {
            self.reject(&e, transport);
            return Ok(());
        }
        self.on_data_available(transport);
        Ok(())
    }

    /// Handle a body frame.
    ///
    /// # Errors
    ///
    /// Returns a [`SequencerError`] if the frame violates the stream's final
    /// size or flow-control window. The caller resets the stream.
    pub fn on_data(
        &mut self,
        offset: u64,
        data: Bytes,
        fin: bool,
        transport: &mut dyn ConnectionTransport,
    ) -> Result<(), SequencerError> {
        if self.sequencer.on_frame(offset, data, fin)? {
            self.on_data_available(transport);
        }
        Ok(())
    }

    fn on_data_available(&mut self, transport: &mut dyn ConnectionTransport) {
        match self.assembler.on_data_available(&mut self.sequencer) {
            Ok(AssemblyProgress::Complete) => self.deliver(transport),
            Ok(AssemblyProgress::Idle | AssemblyProgress::Suspended) => {}
            Err(e) => self.reject(&e, transport),
        }
    }

    fn deliver(&mut self, transport: &mut dyn ConnectionTransport) {
        for (name, value) in self.assembler.headers().iter() {
            self.processor.on_header(name, value);
        }
        self.processor.process_data(self.assembler.body());
        let mut responder = StreamResponder::new(self.id, transport);
        self.processor.on_fin(&mut responder);
    }

    fn reject(&mut self, error: &RequestError, transport: &mut dyn ConnectionTransport) {
        warn!("malformed request: stream_id={}, error={error}", self.id);
        metrics::inc_stream_errors();
        self.assembler.abort();

        let mut responder = StreamResponder::new(self.id, transport);
        responder.write_headers(&bad_request_headers(), false);
        responder.write_or_buffer_body(BAD_REQUEST_BODY, true);
        responder.close_read_side();
    }

    /// Response entry points for this stream.
    pub fn responder<'a>(&self, transport: &'a mut dyn ConnectionTransport) -> StreamResponder<'a> {
        StreamResponder::new(self.id, transport)
    }
}

impl Drop for ServerStream {
    fn drop(&mut self) {
        debug!("stream closed: stream_id={}", self.id);
        self.processor.on_close();
    }
}

impl fmt::Debug for ServerStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerStream")
            .field("id", &self.id)
            .field("state", &self.assembler.state())
            .finish_non_exhaustive()
    }
}
