//! Wall-clock sources for the regeneration engine.
//!
//! The engine never reads the system time directly. Every caller injects a
//! [`Clock`], so tests can pin time with [`ManualClock`] and production uses
//! [`SystemClock`].
//!
//! All instants handed out here are truncated to microseconds. That is the
//! resolution of `PostgreSQL` `TIMESTAMPTZ`; a watermark with nanoseconds
//! would not compare equal after a round-trip and every compare-and-swap
//! commit would conflict.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};

/// Number of fractional-second digits kept on stored timestamps.
const STORAGE_SUBSEC_DIGITS: u16 = 6;

/// A source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Return the current instant at storage precision.
    fn now(&self) -> DateTime<Utc>;
}

/// Truncate an instant to the precision the balance store persists.
pub fn to_storage_precision(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(STORAGE_SUBSEC_DIGITS)
}

/// Production clock backed by [`Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        to_storage_precision(Utc::now())
    }
}

/// Clock with manually controlled time.
///
/// Stores microseconds since the Unix epoch in an atomic so it can be
/// shared across tasks without locking.
#[derive(Debug)]
pub struct ManualClock {
    micros: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            micros: AtomicI64::new(start.timestamp_micros()),
        }
    }

    /// Jump to an absolute instant (may move backwards).
    pub fn set(&self, instant: DateTime<Utc>) {
        self.micros
            .store(instant.timestamp_micros(), Ordering::SeqCst);
    }

    /// Move the clock by `delta` (negative deltas move it backwards).
    ///
    /// Saturates at the representable range instead of wrapping.
    pub fn advance(&self, delta: TimeDelta) {
        let step = delta.num_microseconds().unwrap_or(i64::MAX);
        let _ = self
            .micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(step))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.micros.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn system_clock_drops_nanoseconds() {
        let now = SystemClock.now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn manual_clock_set_and_advance() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().unwrap_or_default();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(TimeDelta::minutes(20));
        assert_eq!(clock.now(), start + TimeDelta::minutes(20));

        clock.advance(TimeDelta::minutes(-30));
        assert_eq!(clock.now(), start - TimeDelta::minutes(10));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn storage_precision_truncates_not_rounds() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().unwrap_or_default();
        let instant = base + TimeDelta::nanoseconds(1_999);
        assert_eq!(to_storage_precision(instant), base + TimeDelta::microseconds(1));
    }
}
