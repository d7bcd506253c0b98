//! A clock tests advance by hand.

use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

use quicframe::helper::Clock;

/// Clock whose time only moves when [`advance`](Self::advance) is called.
///
/// Clones share the same time, so a test keeps one copy and hands another to
/// the dispatcher builder.
#[derive(Clone, Debug)]
pub struct ManualClock(Rc<Cell<Instant>>);

impl ManualClock {
    /// Start at `start`.
    #[must_use]
    pub fn new(start: Instant) -> Self { Self(Rc::new(Cell::new(start))) }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) { self.0.set(self.0.get() + by); }
}

impl Default for ManualClock {
    fn default() -> Self { Self::new(Instant::now()) }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant { self.0.get() }
}
