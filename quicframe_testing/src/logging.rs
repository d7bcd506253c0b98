//! Serialised access to the global `logtest` logger.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use logtest::Logger;
use rstest::fixture;

/// Exclusive handle to the process-wide [`Logger`].
///
/// `logtest` installs one global logger, so tests asserting on log output
/// hold this guard to keep their records apart.
pub struct LoggerHandle {
    guard: MutexGuard<'static, Logger>,
}

impl LoggerHandle {
    /// Acquire the logger, discarding records left by earlier holders.
    #[must_use]
    pub fn new() -> Self {
        static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

        let logger = LOGGER.get_or_init(|| Mutex::new(Logger::start()));
        let mut guard = logger.lock().unwrap_or_else(PoisonError::into_inner);
        while guard.pop().is_some() {}
        Self { guard }
    }

    /// Drain captured records, returning their messages in order.
    pub fn messages(&mut self) -> Vec<String> {
        let mut messages = Vec::new();
        while let Some(record) = self.guard.pop() {
            messages.push(record.args().to_owned());
        }
        messages
    }

    /// Returns `true` if any captured message contains `needle`. Records are
    /// consumed.
    pub fn contains(&mut self, needle: &str) -> bool {
        self.messages().iter().any(|message| message.contains(needle))
    }
}

impl Default for LoggerHandle {
    fn default() -> Self { Self::new() }
}

impl std::ops::Deref for LoggerHandle {
    type Target = Logger;

    fn deref(&self) -> &Self::Target { &self.guard }
}

impl std::ops::DerefMut for LoggerHandle {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.guard }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn logger() -> LoggerHandle { LoggerHandle::new() }
