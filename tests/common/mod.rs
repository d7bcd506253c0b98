//! Shared utilities for integration tests.
//!
//! Provides endpoint helpers and a [`Harness`] wiring a dispatcher to a
//! recording sink and the loopback transport, plus decoding of the
//! responses written to a peer.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::net::{IpAddr, Ipv4Addr};

use quicframe::{
    DispatcherConfig,
    Endpoint,
    PacketDispatcher,
    StreamId,
    headers::Headers,
};
use quicframe_testing::{
    LoopbackFactory,
    ManualClock,
    ProcessorLog,
    RecordingProcessor,
    RecordingSink,
    Reply,
    TestFrame,
    decode_frames,
    encode_frames,
    request_frames,
};
use rstest::fixture;

/// Endpoint the server listens on.
pub fn local() -> Endpoint { Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4433) }

/// A distinct client endpoint per `n`.
pub fn peer(n: u16) -> Endpoint { Endpoint::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)), 40_000 + n) }

/// Dispatcher under test together with the doubles it was built from.
pub struct Harness {
    pub dispatcher: PacketDispatcher<RecordingSink>,
    pub sink: RecordingSink,
    pub transports: LoopbackFactory,
    pub log: ProcessorLog,
    pub clock: ManualClock,
}

impl Harness {
    /// Build with `config` and processors answering per `reply`.
    #[expect(
        clippy::expect_used,
        reason = "an invalid test configuration must abort the test immediately"
    )]
    pub fn with(config: DispatcherConfig, transports: LoopbackFactory, reply: Reply) -> Self {
        let sink = RecordingSink::default();
        let log = ProcessorLog::default();
        let clock = ManualClock::default();
        let dispatcher = PacketDispatcher::builder(
            sink.clone(),
            transports.clone(),
            RecordingProcessor::factory_with(log.clone(), reply),
        )
        .config(config)
        .clock(clock.clone())
        .build()
        .expect("test configuration is valid");
        Self {
            dispatcher,
            sink,
            transports,
            log,
            clock,
        }
    }

    /// Send `frames` from `peer` as one datagram.
    pub fn send(&mut self, peer: &Endpoint, frames: &[TestFrame]) {
        self.dispatcher.dispatch(&local(), peer, &encode_frames(frames));
    }

    /// Send a complete request on `stream_id` from `peer`.
    pub fn request(&mut self, peer: &Endpoint, stream_id: StreamId, headers: &Headers, body: &[u8]) {
        self.send(peer, &request_frames(stream_id, headers, body));
    }

    /// Every frame written to `peer`, in order.
    #[expect(
        clippy::expect_used,
        reason = "the server only writes loopback datagrams"
    )]
    pub fn frames_to(&self, peer: &Endpoint) -> Vec<TestFrame> {
        self.sink
            .sent_to(peer)
            .iter()
            .flat_map(|datagram| decode_frames(datagram).expect("loopback datagram"))
            .collect()
    }
}

/// Harness with default configuration and echoing processors.
#[fixture]
pub fn harness() -> Harness {
    Harness::with(DispatcherConfig::default(), LoopbackFactory::default(), Reply::Echo)
}

/// Request headers for a POST with the given content length.
pub fn post(content_length: Option<&str>) -> Headers {
    let mut headers: Headers = [(":method", "POST"), (":path", "/upload")]
        .into_iter()
        .collect();
    if let Some(length) = content_length {
        headers.append("content-length", length);
    }
    headers
}

/// Response frames answering a malformed request on `stream_id`.
pub fn bad_request(stream_id: StreamId) -> Vec<TestFrame> {
    vec![
        TestFrame::ResponseHeaders {
            stream_id,
            headers: vec![
                (":status".to_owned(), "400".to_owned()),
                ("content-length".to_owned(), "11".to_owned()),
            ],
            fin: false,
        },
        TestFrame::ResponseData {
            stream_id,
            data: b"bad request".to_vec(),
            fin: true,
        },
        TestFrame::CloseReadSide { stream_id },
    ]
}
