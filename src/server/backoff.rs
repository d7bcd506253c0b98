//! Back-off configuration for the server receive loop.

use std::time::Duration;

/// Exponential back-off applied when receiving from the socket fails.
///
/// The delay starts at `initial_delay`, doubles after each consecutive
/// failure and is capped at `max_delay`. A successful receive resets it.
///
/// # Default Values
/// - `initial_delay`: 10 milliseconds
/// - `max_delay`: 1 second
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Clamp both delays to at least one millisecond and order them.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use quicframe::server::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::ZERO,
    /// };
    ///
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.initial_delay, Duration::from_millis(1));
    /// assert_eq!(normalized.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Delay following `current`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}
