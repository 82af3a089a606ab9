//! Timestamp sources for posts, comments, and messages.
//!
//! The store never calls `Utc::now()` directly; it asks its [`Clock`].
//! The engine and the synthetic workload use [`SystemClock`]. Store tests
//! use [`SteppingClock`], which hands out strictly increasing instants so
//! time-ordered feeds are deterministic.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};

/// Source of creation timestamps.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that advances by a fixed step every time it is read.
///
/// The first reading is `base`, the next `base + step`, and so on.
#[derive(Debug)]
pub struct SteppingClock {
    /// Instant returned by the first reading.
    base: DateTime<Utc>,
    /// Step length in milliseconds.
    step_ms: i64,
    /// Readings taken so far.
    readings: AtomicI64,
}

impl SteppingClock {
    /// Create a clock starting at `base` and advancing `step_ms` per reading.
    pub const fn new(base: DateTime<Utc>, step_ms: i64) -> Self {
        Self {
            base,
            step_ms,
            readings: AtomicI64::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let n = self.readings.fetch_add(1, Ordering::Relaxed);
        let offset = TimeDelta::try_milliseconds(n.saturating_mul(self.step_ms))
            .unwrap_or_else(TimeDelta::zero);
        self.base.checked_add_signed(offset).unwrap_or(self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepping_clock_advances_per_reading() {
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        let clock = SteppingClock::new(base, 250);
        assert_eq!(clock.now(), base);
        assert_eq!(clock.now(), base + TimeDelta::milliseconds(250));
        assert_eq!(clock.now(), base + TimeDelta::milliseconds(500));
    }

    #[test]
    fn system_clock_is_monotone_enough_for_ordering() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
