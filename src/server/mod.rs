//! Tokio runtime adapter driving a [`PacketDispatcher`] over UDP.
//!
//! `DatagramServer` owns a bound [`UdpSocket`] and one dispatcher. It
//! receives datagrams and dispatches them, retries writes the socket
//! refused and fires transport alarms, all on the current task. The
//! dispatcher is `!Send`, so the server future must run on a current-thread
//! runtime or inside a [`tokio::task::LocalSet`].

mod backoff;
mod error;
mod runtime;
mod sink;

use std::{net::SocketAddr, sync::Arc};

use tokio::net::UdpSocket;

pub use self::{
    backoff::BackoffConfig,
    error::ServerError,
    sink::{ERR_FAILED, UdpSink},
};
use crate::{config::ConfigError, dispatcher::PacketDispatcher, endpoint::Endpoint};

/// Default size of the receive buffer, large enough for any UDP payload.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65_535;

/// UDP server feeding one [`PacketDispatcher`].
pub struct DatagramServer {
    socket: Arc<UdpSocket>,
    local: Endpoint,
    dispatcher: PacketDispatcher<UdpSink>,
    backoff: BackoffConfig,
    recv_buffer_size: usize,
}

impl DatagramServer {
    /// Bind `addr` and build the dispatcher around a sink for the new
    /// socket.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the socket cannot be bound and
    /// [`ServerError::Config`] if `build` rejects its configuration.
    pub async fn bind<F>(addr: SocketAddr, build: F) -> Result<Self, ServerError>
    where
        F: FnOnce(UdpSink) -> Result<PacketDispatcher<UdpSink>, ConfigError>,
    {
        let socket = UdpSocket::bind(addr).await.map_err(ServerError::Bind)?;
        Self::from_socket(socket, build)
    }

    /// Serve on an already bound socket.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LocalAddr`] if the socket's address cannot be
    /// read and [`ServerError::Config`] if `build` rejects its
    /// configuration.
    pub fn from_socket<F>(socket: UdpSocket, build: F) -> Result<Self, ServerError>
    where
        F: FnOnce(UdpSink) -> Result<PacketDispatcher<UdpSink>, ConfigError>,
    {
        let local = Endpoint::from(socket.local_addr().map_err(ServerError::LocalAddr)?);
        let socket = Arc::new(socket);
        let dispatcher = build(UdpSink::new(Arc::clone(&socket)))?;
        Ok(Self {
            socket,
            local,
            dispatcher,
            backoff: BackoffConfig::default(),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        })
    }

    /// Use `backoff` after receive errors.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// Receive into a buffer of `size` bytes. Longer datagrams are
    /// truncated by the socket.
    #[must_use]
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size.max(1);
        self
    }

    /// Endpoint the server is bound to.
    #[must_use]
    pub fn local_endpoint(&self) -> Endpoint { self.local }

    /// The driven dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &PacketDispatcher<UdpSink> { &self.dispatcher }

    /// Mutable access to the driven dispatcher.
    pub fn dispatcher_mut(&mut self) -> &mut PacketDispatcher<UdpSink> { &mut self.dispatcher }
}
