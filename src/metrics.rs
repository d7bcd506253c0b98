//! Metric helpers for `quicframe`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. With the
//! `metrics` feature disabled every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking live sessions.
pub const SESSIONS_ACTIVE: &str = "quicframe_sessions_active";
/// Name of the counter tracking datagrams handled.
pub const PACKETS_PROCESSED: &str = "quicframe_packets_total";
/// Name of the counter tracking writes that hit backpressure.
pub const WRITES_BLOCKED: &str = "quicframe_writes_blocked_total";
/// Name of the counter tracking failed writes.
pub const WRITE_ERRORS: &str = "quicframe_write_errors_total";
/// Name of the counter tracking streams aborted on malformed input.
pub const STREAM_ERRORS: &str = "quicframe_stream_errors_total";

/// Direction of datagram processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Datagrams received from a peer.
    Inbound,
    /// Datagrams written to a peer.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the active sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a datagram handled in the given direction.
pub fn inc_packets(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(PACKETS_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a write that returned the blocked status.
pub fn inc_writes_blocked() {
    #[cfg(feature = "metrics")]
    counter!(WRITES_BLOCKED).increment(1);
}

/// Record a write that failed.
pub fn inc_write_errors() {
    #[cfg(feature = "metrics")]
    counter!(WRITE_ERRORS).increment(1);
}

/// Record a stream aborted because of malformed input.
pub fn inc_stream_errors() {
    #[cfg(feature = "metrics")]
    counter!(STREAM_ERRORS).increment(1);
}
