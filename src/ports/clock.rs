//! Time source port, so cooldown logic can run against a manual clock.

use std::time::Instant;

/// Supplies the current monotonic time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// Wall-clock implementation backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: parking_lot::Mutex<std::time::Duration>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self { base: Instant::now(), offset: parking_lot::Mutex::new(std::time::Duration::ZERO) }
    }

    pub fn advance(&self, by: std::time::Duration) {
        *self.offset.lock() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}
