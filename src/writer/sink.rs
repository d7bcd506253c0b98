//! Contract for the external datagram sink the write bridge sits on.

use crate::endpoint::Endpoint;

/// Raw status code a sink reports while a write is still in progress.
pub const ERR_IO_PENDING: i64 = -1;

/// Raw status code reported for datagrams too large to hand to the sink.
pub const ERR_MSG_TOO_BIG: i32 = -142;

/// Immediate outcome of handing one datagram to a [`DatagramSink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkStatus {
    /// The sink accepted this many bytes.
    Sent(usize),
    /// The sink buffered the datagram and will report completion later via
    /// the bridge's `on_write_complete`.
    Pending,
    /// The write failed with a negative error code.
    Failed(i32),
}

impl SinkStatus {
    /// Interpret a raw status code: non-negative values are byte counts,
    /// [`ERR_IO_PENDING`] is the blocked sentinel and any other negative
    /// value is an error code.
    ///
    /// # Examples
    ///
    /// ```
    /// use quicframe::writer::{ERR_IO_PENDING, SinkStatus};
    ///
    /// assert_eq!(SinkStatus::from_code(12), SinkStatus::Sent(12));
    /// assert_eq!(SinkStatus::from_code(ERR_IO_PENDING), SinkStatus::Pending);
    /// assert_eq!(SinkStatus::from_code(-104), SinkStatus::Failed(-104));
    /// ```
    #[must_use]
    pub fn from_code(rv: i64) -> Self {
        if rv == ERR_IO_PENDING {
            return Self::Pending;
        }
        match usize::try_from(rv) {
            Ok(sent) => Self::Sent(sent),
            Err(_) => Self::Failed(i32::try_from(rv).unwrap_or(i32::MIN)),
        }
    }
}

/// Destination for outbound datagrams.
///
/// A sink either completes a write synchronously or buffers the datagram and
/// reports [`SinkStatus::Pending`]. In the latter case the embedding runtime
/// must later call `on_write_complete` exactly once with the final status.
pub trait DatagramSink {
    /// Send `datagram` to `destination`.
    fn send(&mut self, destination: &Endpoint, datagram: &[u8]) -> SinkStatus;
}

impl<S: DatagramSink + ?Sized> DatagramSink for Box<S> {
    fn send(&mut self, destination: &Endpoint, datagram: &[u8]) -> SinkStatus {
        (**self).send(destination, datagram)
    }
}
