//! Errors raised by [`DatagramServer`](super::DatagramServer) operations.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that may occur while setting up or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the UDP socket failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// The bound socket's local address could not be read.
    #[error("local address unavailable: {0}")]
    LocalAddr(#[source] io::Error),
    /// The dispatcher configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
