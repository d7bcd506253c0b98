//! [`DatagramSink`] over a tokio UDP socket.

use std::{io, sync::Arc};

use log::debug;
use tokio::net::UdpSocket;

use crate::{
    endpoint::Endpoint,
    writer::{DatagramSink, SinkStatus},
};

/// Generic failure code used when the OS reports no error number.
pub const ERR_FAILED: i32 = -2;

/// Negative status code for an I/O error.
fn error_code(err: &io::Error) -> i32 {
    err.raw_os_error()
        .filter(|code| *code > 0)
        .map_or(ERR_FAILED, |code| -code)
}

/// Writes datagrams with `try_send_to`.
///
/// When the socket would block the datagram is kept and
/// [`SinkStatus::Pending`] is returned. The runtime retries it with
/// [`flush_pending`](Self::flush_pending) once the socket is writable and
/// reports the outcome to the dispatcher.
#[derive(Debug)]
pub struct UdpSink {
    socket: Arc<UdpSocket>,
    pending: Option<(Endpoint, Vec<u8>)>,
}

impl UdpSink {
    /// Wrap a bound socket.
    #[must_use]
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self {
            socket,
            pending: None,
        }
    }

    /// Returns `true` while a datagram waits for the socket.
    #[must_use]
    pub fn has_pending(&self) -> bool { self.pending.is_some() }

    /// Retry the stored datagram.
    ///
    /// Returns the raw completion status, or `None` if the socket would still
    /// block and the datagram remains stored.
    pub fn flush_pending(&mut self) -> Option<i64> {
        let (destination, datagram) = self.pending.as_ref()?;
        let status = match self.socket.try_send_to(datagram, destination.socket_addr()) {
            Ok(sent) => i64::try_from(sent).unwrap_or(i64::MAX),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
            Err(e) => {
                debug!("buffered datagram failed: destination={destination}, error={e}");
                i64::from(error_code(&e))
            }
        };
        self.pending = None;
        Some(status)
    }
}

impl DatagramSink for UdpSink {
    fn send(&mut self, destination: &Endpoint, datagram: &[u8]) -> SinkStatus {
        match self.socket.try_send_to(datagram, destination.socket_addr()) {
            Ok(sent) => SinkStatus::Sent(sent),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.pending = Some((*destination, datagram.to_vec()));
                SinkStatus::Pending
            }
            Err(e) => SinkStatus::Failed(error_code(&e)),
        }
    }
}
