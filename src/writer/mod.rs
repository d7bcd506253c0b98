//! Single-slot, backpressure-aware writer for outbound datagrams.
//!
//! [`WriteBridge`] adapts a [`DatagramSink`] that may buffer writes and
//! signal backpressure into a one-write-at-a-time channel. A write either
//! completes immediately or leaves the bridge write-blocked until the
//! embedding runtime reports completion through
//! [`WriteBridge::on_write_complete`]. Completion is delivered through a
//! one-shot [`WriteCallback`], so a callback can fire at most once and tests
//! can observe whether it fired at all.
//!
//! One bridge serves every session of a dispatcher. While it is blocked,
//! outbound datagrams from all sessions wait.

mod error;
mod sink;

use log::{debug, error, warn};
use tokio::sync::oneshot;

pub use self::{
    error::WriteBridgeError,
    sink::{DatagramSink, ERR_IO_PENDING, ERR_MSG_TOO_BIG, SinkStatus},
};
use crate::{endpoint::Endpoint, metrics};

/// Default maximum datagram size reported for any peer.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1350;

/// Outcome of a write, either immediate or delivered on completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteResult {
    /// The write finished and this many bytes were accepted.
    Ok(usize),
    /// The sink is applying backpressure; completion follows later.
    Blocked,
    /// The write failed with a negative error code.
    Error(i32),
}

impl WriteResult {
    /// Returns `true` for [`WriteResult::Blocked`].
    #[must_use]
    pub const fn is_blocked(&self) -> bool { matches!(self, Self::Blocked) }

    fn from_completion_code(rv: i64) -> Self {
        match usize::try_from(rv) {
            Ok(written) => Self::Ok(written),
            Err(_) => Self::Error(i32::try_from(rv).unwrap_or(i32::MIN)),
        }
    }
}

/// Sending half of a write completion.
pub type WriteCallback = oneshot::Sender<WriteResult>;

/// Receiving half of a write completion.
///
/// `try_recv` yields the final result once a blocked write completes. A
/// closed channel without a value means the write finished synchronously and
/// its result was returned directly.
pub type WriteCompletion = oneshot::Receiver<WriteResult>;

/// Create a linked [`WriteCallback`] and [`WriteCompletion`].
#[must_use]
pub fn write_completion() -> (WriteCallback, WriteCompletion) { oneshot::channel() }

/// Observable state of a [`WriteBridge`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    /// No write is outstanding.
    Idle,
    /// A write was accepted by the sink but has not completed yet.
    WriteBlocked,
}

/// The single outstanding write. The sink owns the datagram bytes while the
/// write is pending, so only the destination and callback are kept here.
#[derive(Debug)]
struct PendingWrite {
    destination: Endpoint,
    len: usize,
    on_complete: WriteCallback,
}

/// Serialises datagram writes against a sink that may apply backpressure.
///
/// # Examples
///
/// ```
/// use quicframe::{
///     endpoint::Endpoint,
///     writer::{DatagramSink, SinkStatus, WriteBridge, WriteResult, write_completion},
/// };
///
/// struct Discard;
///
/// impl DatagramSink for Discard {
///     fn send(&mut self, _to: &Endpoint, datagram: &[u8]) -> SinkStatus {
///         SinkStatus::Sent(datagram.len())
///     }
/// }
///
/// let local = Endpoint::from_octets(&[127, 0, 0, 1], 4433).expect("local");
/// let peer = Endpoint::from_octets(&[127, 0, 0, 1], 50_000).expect("peer");
/// let mut bridge = WriteBridge::new(Discard);
/// let (callback, _completion) = write_completion();
/// let result = bridge
///     .write_with_callback(b"ping", &local, &peer, callback)
///     .expect("no write pending");
/// assert_eq!(result, WriteResult::Ok(4));
/// assert!(!bridge.is_write_blocked());
/// ```
#[derive(Debug)]
pub struct WriteBridge<S> {
    sink: S,
    pending: Option<PendingWrite>,
    max_packet_size: usize,
}

impl<S: DatagramSink> WriteBridge<S> {
    /// Wrap `sink` with the default maximum packet size.
    #[must_use]
    pub fn new(sink: S) -> Self { Self::with_max_packet_size(sink, DEFAULT_MAX_PACKET_SIZE) }

    /// Wrap `sink`, reporting `max_packet_size` for every peer.
    #[must_use]
    pub fn with_max_packet_size(sink: S, max_packet_size: usize) -> Self {
        Self {
            sink,
            pending: None,
            max_packet_size,
        }
    }

    /// Write `buffer` to `peer`, installing `on_complete` for a blocked write.
    ///
    /// On an immediate success or failure the callback is dropped without
    /// being invoked and the result is returned directly. On
    /// [`WriteResult::Blocked`] the bridge keeps the callback and refuses
    /// further writes until [`on_write_complete`](Self::on_write_complete)
    /// runs.
    ///
    /// # Errors
    ///
    /// Returns [`WriteBridgeError::WriteAlreadyPending`] if a previous write
    /// has not completed. Bridge state is left untouched.
    pub fn write_with_callback(
        &mut self,
        buffer: &[u8],
        self_addr: &Endpoint,
        peer: &Endpoint,
        on_complete: WriteCallback,
    ) -> Result<WriteResult, WriteBridgeError> {
        if let Some(pending) = &self.pending {
            error!(
                "write issued while another is pending: pending_destination={}, destination={peer}",
                pending.destination
            );
            return Err(WriteBridgeError::WriteAlreadyPending {
                destination: pending.destination,
            });
        }

        let status = if i32::try_from(buffer.len()).is_ok() {
            self.sink.send(peer, buffer)
        } else {
            SinkStatus::Failed(ERR_MSG_TOO_BIG)
        };

        match status {
            SinkStatus::Sent(written) => {
                metrics::inc_packets(metrics::Direction::Outbound);
                Ok(WriteResult::Ok(written))
            }
            SinkStatus::Pending => {
                debug!(
                    "write blocked: local={self_addr}, destination={peer}, len={}",
                    buffer.len()
                );
                metrics::inc_writes_blocked();
                self.pending = Some(PendingWrite {
                    destination: *peer,
                    len: buffer.len(),
                    on_complete,
                });
                Ok(WriteResult::Blocked)
            }
            SinkStatus::Failed(code) => {
                warn!("write failed: destination={peer}, code={code}");
                metrics::inc_write_errors();
                Ok(WriteResult::Error(code))
            }
        }
    }

    /// Report completion of the blocked write with raw status `rv`.
    ///
    /// The bridge returns to [`WriterState::Idle`] and the stored callback
    /// receives `Ok(rv)` for non-negative values or `Error(rv)` otherwise.
    /// The caller is responsible for letting blocked sessions resume.
    ///
    /// # Errors
    ///
    /// Returns [`WriteBridgeError::PendingStatusOnCompletion`] if `rv` is the
    /// pending sentinel and [`WriteBridgeError::NoPendingWrite`] if no write
    /// was outstanding.
    pub fn on_write_complete(&mut self, rv: i64) -> Result<WriteResult, WriteBridgeError> {
        if rv == ERR_IO_PENDING {
            error!("write completion carried the pending status code");
            return Err(WriteBridgeError::PendingStatusOnCompletion);
        }
        let Some(pending) = self.pending.take() else {
            error!("write completion reported with no pending write: rv={rv}");
            return Err(WriteBridgeError::NoPendingWrite);
        };

        let result = WriteResult::from_completion_code(rv);
        match result {
            WriteResult::Error(code) => {
                warn!(
                    "blocked write failed: destination={}, code={code}",
                    pending.destination
                );
                metrics::inc_write_errors();
            }
            _ => {
                debug!(
                    "blocked write completed: destination={}, len={}",
                    pending.destination, pending.len
                );
                metrics::inc_packets(metrics::Direction::Outbound);
            }
        }
        if pending.on_complete.send(result).is_err() {
            debug!("write completion receiver dropped before completion");
        }
        Ok(result)
    }

    /// Returns `true` while a write is outstanding.
    #[must_use]
    pub fn is_write_blocked(&self) -> bool { self.pending.is_some() }

    /// Current bridge state.
    #[must_use]
    pub fn state(&self) -> WriterState {
        if self.pending.is_some() {
            WriterState::WriteBlocked
        } else {
            WriterState::Idle
        }
    }

    /// Largest datagram that may be written to `peer`.
    #[must_use]
    pub fn max_packet_size(&self, _peer: &Endpoint) -> usize { self.max_packet_size }

    /// Borrow the underlying sink.
    #[must_use]
    pub fn sink(&self) -> &S { &self.sink }

    /// Mutably borrow the underlying sink.
    pub fn sink_mut(&mut self) -> &mut S { &mut self.sink }
}
