//! Per-stream request assembly.
//!
//! A [`RequestAssembler`] turns a stream's header block and the body bytes
//! that follow it into a validated request. It walks the states
//!
//! ```text
//! AwaitingHeaders -> HeadersComplete -> AccumulatingBody -> Closed
//! ```
//!
//! and drops straight to `Closed` on malformed input: an undecodable or
//! empty header block, a bad or conflicting `content-length`, or a body
//! longer than the declared length. Once closed the assembler consumes no
//! further bytes.
//!
//! Body accumulation never blocks. When the source has no readable bytes and
//! the stream has not ended, [`RequestAssembler::on_data_available`] returns
//! [`AssemblyProgress::Suspended`] and is called again on the next
//! data-available signal.

mod content_length;
mod error;

use bytes::BytesMut;

pub use self::{
    content_length::{CONTENT_LENGTH, parse_content_length},
    error::RequestError,
};
use crate::{
    headers::{HeaderBlockDecoder, Headers},
    sequencer::ByteSource,
};

/// Assembly state of one stream's request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssemblyState {
    /// No header block has been decoded yet.
    AwaitingHeaders,
    /// Headers were decoded and validated; the body has not been read.
    HeadersComplete,
    /// Body bytes are being accumulated.
    AccumulatingBody,
    /// The request completed or was aborted.
    Closed,
}

/// Result of a body-read pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssemblyProgress {
    /// Nothing to do in the current state.
    Idle,
    /// All available bytes were consumed and the stream is still open.
    Suspended,
    /// The stream ended; headers and body are ready to hand over.
    Complete,
}

/// State machine assembling a request from a header block and body bytes.
#[derive(Debug)]
pub struct RequestAssembler {
    state: AssemblyState,
    headers: Headers,
    content_length: Option<u64>,
    body: BytesMut,
}

impl Default for RequestAssembler {
    fn default() -> Self { Self::new() }
}

impl RequestAssembler {
    /// Create an assembler awaiting its header block.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AssemblyState::AwaitingHeaders,
            headers: Headers::new(),
            content_length: None,
            body: BytesMut::new(),
        }
    }

    /// Decode and validate the stream's header block.
    ///
    /// Bytes in `block` past the end of the decoded headers are treated as
    /// the start of the body.
    ///
    /// # Errors
    ///
    /// Returns a [`RequestError`] and closes the assembler if the block is
    /// malformed or empty, a second block arrives, the `content-length`
    /// header is invalid, or trailing bytes already exceed the declared
    /// length.
    pub fn on_headers_complete(
        &mut self,
        block: &[u8],
        decoder: &dyn HeaderBlockDecoder,
    ) -> Result<(), RequestError> {
        if self.state != AssemblyState::AwaitingHeaders {
            self.state = AssemblyState::Closed;
            return Err(RequestError::DuplicateHeaderBlock);
        }
        self.parse_request_headers(block, decoder).inspect_err(|_| {
            self.state = AssemblyState::Closed;
        })?;
        self.state = AssemblyState::HeadersComplete;
        Ok(())
    }

    fn parse_request_headers(
        &mut self,
        block: &[u8],
        decoder: &dyn HeaderBlockDecoder,
    ) -> Result<(), RequestError> {
        let decoded = decoder.decode(block)?;
        if decoded.consumed == 0 || decoded.headers.is_empty() {
            return Err(RequestError::EmptyHeaders);
        }
        if let Some(trailing) = block.get(decoded.consumed..) {
            self.body.extend_from_slice(trailing);
        }
        self.content_length = parse_content_length(&decoded.headers)?;
        self.headers = decoded.headers;
        self.check_body_length()
    }

    fn check_body_length(&self) -> Result<(), RequestError> {
        match self.content_length {
            Some(declared) if self.body.len() as u64 > declared => Err(RequestError::BodyTooLong {
                declared,
                received: self.body.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Pull every readable region from `source` into the body.
    ///
    /// Each region is consumed from the source once it has been appended and
    /// checked against the declared length.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::BodyTooLong`] and closes the assembler as soon
    /// as the body exceeds the declared content length. The offending region
    /// is left unconsumed.
    pub fn on_data_available(
        &mut self,
        source: &mut dyn ByteSource,
    ) -> Result<AssemblyProgress, RequestError> {
        match self.state {
            AssemblyState::AwaitingHeaders | AssemblyState::Closed => {
                return Ok(AssemblyProgress::Idle);
            }
            AssemblyState::HeadersComplete => self.state = AssemblyState::AccumulatingBody,
            AssemblyState::AccumulatingBody => {}
        }

        while let Some(region) = source.readable_region() {
            let len = region.len();
            self.body.extend_from_slice(region);
            if let Err(e) = self.check_body_length() {
                self.state = AssemblyState::Closed;
                return Err(e);
            }
            source.mark_consumed(len);
        }

        if !source.is_closed() {
            source.set_unblocked();
            return Ok(AssemblyProgress::Suspended);
        }

        self.state = AssemblyState::Closed;
        Ok(AssemblyProgress::Complete)
    }

    /// Close the assembler without completing the request.
    pub fn abort(&mut self) { self.state = AssemblyState::Closed; }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AssemblyState { self.state }

    /// Decoded request headers.
    #[must_use]
    pub fn headers(&self) -> &Headers { &self.headers }

    /// Declared body length, once parsed.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> { self.content_length }

    /// Body bytes accumulated so far.
    #[must_use]
    pub fn body(&self) -> &[u8] { &self.body }
}
