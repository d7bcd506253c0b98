//! Canonical error and result types for the crate.
//!
//! Each layer reports failures through its own error enum. `QuicframeError`
//! gathers them for callers that drive several layers and want one `?`
//! target.

use thiserror::Error;

use crate::{
    assembler::RequestError,
    config::ConfigError,
    endpoint::EndpointError,
    headers::HeaderDecodeError,
    sequencer::SequencerError,
    server::ServerError,
    writer::WriteBridgeError,
};

/// Top-level error type exposed by `quicframe`.
#[derive(Debug, Error)]
pub enum QuicframeError {
    /// An address could not be turned into an [`Endpoint`](crate::endpoint::Endpoint).
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    /// The write bridge's completion contract was violated.
    #[error(transparent)]
    Write(#[from] WriteBridgeError),
    /// A header block could not be decoded.
    #[error(transparent)]
    HeaderDecode(#[from] HeaderDecodeError),
    /// A request was malformed.
    #[error(transparent)]
    Request(#[from] RequestError),
    /// Stream data violated its framing.
    #[error(transparent)]
    Sequencer(#[from] SequencerError),
    /// The dispatcher configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The UDP runtime failed.
    #[error(transparent)]
    Server(#[from] ServerError),
}

impl QuicframeError {
    /// Returns `true` if the error was caused by the peer rather than local
    /// setup or a caller's contract violation.
    #[must_use]
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Self::HeaderDecode(_) | Self::Request(_) | Self::Sequencer(_)
        )
    }
}

/// Canonical result alias used by `quicframe` public APIs.
pub type Result<T, E = QuicframeError> = std::result::Result<T, E>;
