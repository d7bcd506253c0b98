//! Contract violations reported by the write bridge.

use thiserror::Error;

use crate::endpoint::Endpoint;

/// Programming errors detected by [`WriteBridge`](super::WriteBridge).
///
/// None of these are recoverable at runtime; they indicate the caller broke
/// the single-outstanding-write contract.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WriteBridgeError {
    /// A write was issued while another write was still pending.
    #[error("write issued while a write to {destination} is still pending")]
    WriteAlreadyPending {
        /// Destination of the write that is still outstanding.
        destination: Endpoint,
    },
    /// A completion arrived although no write was pending.
    #[error("write completion reported with no pending write")]
    NoPendingWrite,
    /// A completion carried the pending sentinel instead of a final status.
    #[error("write completion reported the pending status code")]
    PendingStatusOnCompletion,
}
