#![doc(html_root_url = "https://docs.rs/quicframe/latest")]
//! Public API for the `quicframe` library.
//!
//! This crate provides the server-side session core of a QUIC-like
//! transport: datagram dispatch to per-peer sessions, a single-slot
//! backpressure writer shared by all sessions, and per-stream request
//! assembly handing completed requests to application processors.
//!
//! The core is sans-io and single-threaded. [`server::DatagramServer`]
//! drives it over a tokio UDP socket.

pub mod assembler;
pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod headers;
pub mod helper;
pub mod metrics;
pub mod processor;
pub mod sequencer;
pub mod server;
pub mod session;
pub mod stream;
pub mod transport;
pub mod writer;

#[cfg(test)]
mod test_helpers;

pub use config::DispatcherConfig;
pub use dispatcher::{DispatcherBuilder, PacketDispatcher};
pub use endpoint::{Endpoint, EndpointPair};
pub use error::{QuicframeError, Result};
pub use self::metrics::{
    Direction,
    PACKETS_PROCESSED,
    SESSIONS_ACTIVE,
    STREAM_ERRORS,
    WRITE_ERRORS,
    WRITES_BLOCKED,
};
pub use processor::{ProcessorFactory, RequestProcessor, StreamId, StreamResponder};
pub use session::{ConnectionId, SessionId, SessionInfo};
pub use transport::{ConnectionTransport, TransportContext, TransportEvent, TransportFactory};
pub use writer::{DatagramSink, SinkStatus, WriteBridge, WriteResult};
