//! Dispatcher configuration.
//!
//! Flow-control windows start at the protocol minimum. A server raises them
//! to its own defaults with [`DispatcherConfig::apply_server_defaults`],
//! which leaves any window the caller already changed untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::writer::DEFAULT_MAX_PACKET_SIZE;

/// Smallest flow-control window the protocol permits.
pub const MIN_FLOW_CONTROL_WINDOW: u64 = 16 * 1024;
/// Server default for the initial per-stream window.
pub const DEFAULT_STREAM_FLOW_CONTROL_WINDOW: u64 = 64 * 1024;
/// Server default for the initial per-session window.
pub const DEFAULT_SESSION_FLOW_CONTROL_WINDOW: u64 = 1024 * 1024;
/// Default limit on concurrently open streams per session.
pub const DEFAULT_MAX_STREAMS_PER_SESSION: usize = 100;

/// Invalid configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A flow-control window was below [`MIN_FLOW_CONTROL_WINDOW`].
    #[error("{name} of {value} bytes is below the minimum of {MIN_FLOW_CONTROL_WINDOW}")]
    WindowTooSmall {
        /// Name of the offending setting.
        name: &'static str,
        /// Configured value.
        value: u64,
    },
    /// `max_packet_size` was zero.
    #[error("max_packet_size must be positive")]
    ZeroPacketSize,
    /// `max_streams_per_session` was zero.
    #[error("max_streams_per_session must be positive")]
    ZeroStreamLimit,
}

/// Settings applied to every session a dispatcher creates.
///
/// # Examples
///
/// ```
/// use quicframe::config::{DEFAULT_STREAM_FLOW_CONTROL_WINDOW, DispatcherConfig};
///
/// let mut config = DispatcherConfig::default();
/// config.apply_server_defaults();
/// assert_eq!(
///     config.initial_stream_flow_control_window,
///     DEFAULT_STREAM_FLOW_CONTROL_WINDOW
/// );
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Initial receive window of each stream, in bytes.
    pub initial_stream_flow_control_window: u64,
    /// Initial receive window of each session, in bytes.
    pub initial_session_flow_control_window: u64,
    /// Largest datagram written to any peer.
    pub max_packet_size: usize,
    /// Streams a session keeps open at once.
    pub max_streams_per_session: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            initial_stream_flow_control_window: MIN_FLOW_CONTROL_WINDOW,
            initial_session_flow_control_window: MIN_FLOW_CONTROL_WINDOW,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_streams_per_session: DEFAULT_MAX_STREAMS_PER_SESSION,
        }
    }
}

impl DispatcherConfig {
    /// Raise windows still at the protocol minimum to the server defaults.
    pub fn apply_server_defaults(&mut self) {
        if self.initial_stream_flow_control_window == MIN_FLOW_CONTROL_WINDOW {
            self.initial_stream_flow_control_window = DEFAULT_STREAM_FLOW_CONTROL_WINDOW;
        }
        if self.initial_session_flow_control_window == MIN_FLOW_CONTROL_WINDOW {
            self.initial_session_flow_control_window = DEFAULT_SESSION_FLOW_CONTROL_WINDOW;
        }
    }

    /// Builder-style variant of [`apply_server_defaults`](Self::apply_server_defaults).
    #[must_use]
    pub fn with_server_defaults(mut self) -> Self {
        self.apply_server_defaults();
        self
    }

    /// Check every setting.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            (
                "initial_stream_flow_control_window",
                self.initial_stream_flow_control_window,
            ),
            (
                "initial_session_flow_control_window",
                self.initial_session_flow_control_window,
            ),
        ] {
            if value < MIN_FLOW_CONTROL_WINDOW {
                return Err(ConfigError::WindowTooSmall { name, value });
            }
        }
        if self.max_packet_size == 0 {
            return Err(ConfigError::ZeroPacketSize);
        }
        if self.max_streams_per_session == 0 {
            return Err(ConfigError::ZeroStreamLimit);
        }
        Ok(())
    }
}
