//! Time and randomness sources shared by every session of a dispatcher.
//!
//! The dispatcher owns its [`ConnectionHelper`] and hands sessions a
//! reference-counted handle, so the helper cannot be released while a
//! session still uses it.

use std::{
    cell::RefCell,
    fmt,
    time::{Duration, Instant},
};

use rand::{RngCore, SeedableRng, rngs::StdRng};

/// Source of the current time.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant { Instant::now() }
}

/// Source of random values for connection ids and tokens.
pub trait RandomSource {
    /// Next random `u64`.
    fn next_u64(&self) -> u64;

    /// Fill `dest` with random bytes.
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// [`RandomSource`] backed by a seeded [`StdRng`].
#[derive(Debug)]
pub struct StdRandom {
    rng: RefCell<StdRng>,
}

impl StdRandom {
    /// Seed from operating system entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: RefCell::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for reproducible runs.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for StdRandom {
    fn next_u64(&self) -> u64 { self.rng.borrow_mut().next_u64() }

    fn fill_bytes(&self, dest: &mut [u8]) { self.rng.borrow_mut().fill_bytes(dest); }
}

/// Clock and random source handed to every session.
pub struct ConnectionHelper {
    clock: Box<dyn Clock>,
    random: Box<dyn RandomSource>,
    epoch: Instant,
}

impl ConnectionHelper {
    /// Combine a clock and a random source.
    #[must_use]
    pub fn new(clock: Box<dyn Clock>, random: Box<dyn RandomSource>) -> Self {
        let epoch = clock.now();
        Self {
            clock,
            random,
            epoch,
        }
    }

    /// Helper using the system clock and an entropy-seeded generator.
    #[must_use]
    pub fn system() -> Self { Self::new(Box::new(SystemClock), Box::new(StdRandom::from_entropy())) }

    /// Current instant.
    #[must_use]
    pub fn now(&self) -> Instant { self.clock.now() }

    /// Microseconds elapsed since the helper was created.
    #[must_use]
    pub fn now_micros(&self) -> u64 {
        let elapsed = self
            .clock
            .now()
            .checked_duration_since(self.epoch)
            .unwrap_or(Duration::ZERO);
        u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
    }

    /// Shared random source.
    #[must_use]
    pub fn random(&self) -> &dyn RandomSource { self.random.as_ref() }
}

impl Default for ConnectionHelper {
    fn default() -> Self { Self::system() }
}

impl fmt::Debug for ConnectionHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHelper")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}
