//! Addressing types for the two sides of a datagram exchange.
//!
//! An [`Endpoint`] is an IP address plus port. Dispatch tables key sessions
//! on an [`EndpointPair`], the local endpoint a datagram arrived on together
//! with the peer endpoint it came from.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
};

use thiserror::Error;

/// Errors raised while building an [`Endpoint`] from raw address bytes.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EndpointError {
    /// The address was neither 4 (IPv4) nor 16 (IPv6) bytes long.
    #[error("invalid address length {0}; expected 4 or 16 bytes")]
    InvalidAddressLength(usize),
}

/// One side of a datagram exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    ip: IpAddr,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from an IP address and port.
    #[must_use]
    pub const fn new(ip: IpAddr, port: u16) -> Self { Self { ip, port } }

    /// Build an endpoint from packed address bytes as handed over by a
    /// socket layer.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::InvalidAddressLength`] unless `address` holds
    /// exactly 4 or 16 bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use quicframe::endpoint::Endpoint;
    ///
    /// let ep = Endpoint::from_octets(&[127, 0, 0, 1], 4433).expect("ipv4 address");
    /// assert_eq!(ep.to_string(), "127.0.0.1:4433");
    /// ```
    pub fn from_octets(address: &[u8], port: u16) -> Result<Self, EndpointError> {
        let ip = match address.len() {
            4 => {
                let mut octets = [0_u8; 4];
                octets.copy_from_slice(address);
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            16 => {
                let mut octets = [0_u8; 16];
                octets.copy_from_slice(address);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            other => return Err(EndpointError::InvalidAddressLength(other)),
        };
        Ok(Self { ip, port })
    }

    /// IP address of this endpoint.
    #[must_use]
    pub const fn ip(&self) -> IpAddr { self.ip }

    /// Port of this endpoint.
    #[must_use]
    pub const fn port(&self) -> u16 { self.port }

    /// Packed network-order address bytes (4 or 16 bytes).
    #[must_use]
    pub fn octets(&self) -> Vec<u8> {
        match self.ip {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        }
    }

    /// Convert into a standard socket address.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.ip, self.port) }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self { Self::new(addr.ip(), addr.port()) }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self { endpoint.socket_addr() }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// The local and remote endpoints of one datagram, used as a session key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EndpointPair {
    /// Endpoint the datagram was received on.
    pub local: Endpoint,
    /// Endpoint the datagram was sent from.
    pub peer: Endpoint,
}

impl EndpointPair {
    /// Pair a local endpoint with a peer endpoint.
    #[must_use]
    pub const fn new(local: Endpoint, peer: Endpoint) -> Self { Self { local, peer } }
}

impl fmt::Display for EndpointPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.local, self.peer)
    }
}
