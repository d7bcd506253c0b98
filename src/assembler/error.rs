//! Malformed-request errors raised during stream request assembly.

use thiserror::Error;

use crate::headers::HeaderDecodeError;

/// Reasons a stream's request was rejected.
///
/// Every variant is local to one stream: the stream is answered with an
/// error response and the rest of the session is unaffected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The header block could not be decoded.
    #[error("header block decode failed: {0}")]
    HeaderDecode(#[from] HeaderDecodeError),
    /// The header block decoded to no headers at all.
    #[error("header block is empty")]
    EmptyHeaders,
    /// A second header block arrived for a stream that already has one.
    #[error("duplicate header block")]
    DuplicateHeaderBlock,
    /// A `content-length` value was not a non-negative integer.
    #[error("invalid content-length value {value:?}")]
    InvalidContentLength {
        /// The offending value.
        value: String,
    },
    /// Repeated `content-length` values disagreed.
    #[error("conflicting content-length values {first} and {conflicting}")]
    ConflictingContentLength {
        /// Value declared first.
        first: u64,
        /// Later value that differed.
        conflicting: u64,
    },
    /// More body bytes arrived than the declared content length.
    #[error("body of {received} bytes exceeds declared content-length {declared}")]
    BodyTooLong {
        /// Declared content length.
        declared: u64,
        /// Bytes received so far.
        received: usize,
    },
}
