//! RAII guard keeping the active sessions gauge in step with the table.

use crate::metrics;

/// Increments the active sessions gauge on creation and decrements it on
/// drop.
#[derive(Debug)]
pub(super) struct ActiveSession;

impl ActiveSession {
    pub(super) fn new() -> Self {
        metrics::inc_sessions();
        Self
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) { metrics::dec_sessions(); }
}
