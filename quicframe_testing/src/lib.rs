//! Test doubles for driving a [`PacketDispatcher`](quicframe::PacketDispatcher)
//! without sockets.
//!
//! [`LoopbackFactory`] supplies a plaintext transport whose datagrams are
//! `bincode`-encoded [`TestFrame`] lists, so tests can script whole requests
//! and decode the responses the dispatcher wrote to a [`RecordingSink`].
//!
//! ```rust
//! use quicframe::{Endpoint, PacketDispatcher};
//! use quicframe_testing::{
//!     LoopbackFactory,
//!     ProcessorLog,
//!     RecordingProcessor,
//!     RecordingSink,
//!     TestFrame,
//!     encode_frames,
//! };
//!
//! let sink = RecordingSink::default();
//! let mut dispatcher = PacketDispatcher::builder(
//!     sink.clone(),
//!     LoopbackFactory::default(),
//!     RecordingProcessor::factory(ProcessorLog::default()),
//! )
//! .build()
//! .expect("valid configuration");
//!
//! let local = Endpoint::from_octets(&[127, 0, 0, 1], 4433).expect("local");
//! let peer = Endpoint::from_octets(&[127, 0, 0, 1], 50_000).expect("peer");
//! dispatcher.dispatch(&local, &peer, &encode_frames(&[TestFrame::Ping]));
//! assert_eq!(dispatcher.session_count(), 1);
//! ```

pub mod clock;
pub mod logging;
pub mod loopback;
pub mod processor;
pub mod sink;

pub use clock::ManualClock;
pub use logging::{LoggerHandle, logger};
pub use loopback::{
    LoopbackFactory,
    LoopbackTransport,
    TestFrame,
    decode_frames,
    encode_frames,
    request_frames,
};
pub use processor::{ProcessorEvent, ProcessorLog, RecordingProcessor, Reply};
pub use sink::RecordingSink;
