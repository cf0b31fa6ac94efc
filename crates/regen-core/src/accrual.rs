//! Tick accrual computation.
//!
//! Given the watermark of the last applied tick and the current time, the
//! policy counts whole ticks elapsed and the balance they yield. It is pure:
//! no I/O, no clock reads, identical inputs give identical outputs.
//!
//! # Watermark rule
//!
//! The new watermark is advanced by whole ticks only:
//!
//! ```text
//! ticks         = floor((now - last_updated_at) / tick_duration)
//! delta         = ticks * yield_per_tick
//! new_watermark = last_updated_at + ticks * tick_duration
//! ```
//!
//! Setting the watermark to `now` instead would discard the partial tick in
//! progress and make the total accrued depend on how often the poller calls.

use chrono::{DateTime, TimeDelta, Utc};

/// Errors raised by the accrual policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccrualError {
    /// Tick duration or yield are out of range.
    #[error("invalid accrual configuration: {reason}")]
    InvalidConfiguration {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },

    /// An intermediate quantity does not fit its integer type.
    #[error("accrual arithmetic overflow computing {quantity}")]
    Overflow {
        /// Which quantity overflowed.
        quantity: &'static str,
    },
}

/// The result of applying the policy to one watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accrual {
    /// Whole ticks between the watermark and `now`.
    pub ticks_elapsed: u64,
    /// Balance to add: `ticks_elapsed * yield_per_tick`.
    pub delta: u64,
    /// Watermark advanced by `ticks_elapsed` whole ticks.
    pub new_last_updated_at: DateTime<Utc>,
}

/// Validated tick parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualPolicy {
    tick_micros: i64,
    yield_per_tick: u64,
}

impl AccrualPolicy {
    /// Build a policy from a tick length and a per-tick yield.
    ///
    /// The tick must be at least one microsecond (the storage resolution)
    /// and the yield must be non-negative.
    ///
    /// # Errors
    ///
    /// Returns [`AccrualError::InvalidConfiguration`] otherwise.
    pub fn new(tick_duration: TimeDelta, yield_per_tick: i64) -> Result<Self, AccrualError> {
        let tick_micros = tick_duration.num_microseconds().ok_or_else(|| {
            AccrualError::InvalidConfiguration {
                reason: "tick duration exceeds the representable range".to_owned(),
            }
        })?;
        if tick_micros <= 0 {
            return Err(AccrualError::InvalidConfiguration {
                reason: format!("tick duration must be positive, got {tick_duration}"),
            });
        }
        let yield_per_tick =
            u64::try_from(yield_per_tick).map_err(|_err| AccrualError::InvalidConfiguration {
                reason: format!("yield per tick must be non-negative, got {yield_per_tick}"),
            })?;
        Ok(Self {
            tick_micros,
            yield_per_tick,
        })
    }

    /// Build a policy from a tick length in whole seconds.
    ///
    /// # Errors
    ///
    /// Returns [`AccrualError::InvalidConfiguration`] for a non-positive
    /// tick, an out-of-range tick, or a negative yield.
    pub fn from_secs(tick_secs: i64, yield_per_tick: i64) -> Result<Self, AccrualError> {
        let tick = TimeDelta::try_seconds(tick_secs).ok_or_else(|| {
            AccrualError::InvalidConfiguration {
                reason: format!("tick duration of {tick_secs}s is out of range"),
            }
        })?;
        Self::new(tick, yield_per_tick)
    }

    /// Length of one tick.
    pub fn tick_duration(&self) -> TimeDelta {
        TimeDelta::microseconds(self.tick_micros)
    }

    /// Quantity accrued per tick.
    pub const fn yield_per_tick(&self) -> u64 {
        self.yield_per_tick
    }

    /// Count whole ticks between `last_updated_at` and `now`.
    ///
    /// A `now` at or before the watermark (clock skew) yields zero ticks and
    /// leaves the watermark where it was.
    ///
    /// # Errors
    ///
    /// Returns [`AccrualError::Overflow`] if the delta or the advanced
    /// watermark cannot be represented.
    pub fn compute(
        &self,
        last_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Accrual, AccrualError> {
        if now <= last_updated_at {
            return Ok(Accrual {
                ticks_elapsed: 0,
                delta: 0,
                new_last_updated_at: last_updated_at,
            });
        }

        let elapsed_micros = now
            .signed_duration_since(last_updated_at)
            .num_microseconds()
            .ok_or(AccrualError::Overflow {
                quantity: "elapsed time",
            })?;
        let ticks = elapsed_micros
            .checked_div(self.tick_micros)
            .ok_or(AccrualError::Overflow { quantity: "ticks" })?;

        let advance_micros = ticks
            .checked_mul(self.tick_micros)
            .ok_or(AccrualError::Overflow {
                quantity: "watermark advance",
            })?;
        let new_last_updated_at = last_updated_at
            .checked_add_signed(TimeDelta::microseconds(advance_micros))
            .ok_or(AccrualError::Overflow {
                quantity: "watermark",
            })?;

        let ticks_elapsed =
            u64::try_from(ticks).map_err(|_err| AccrualError::Overflow { quantity: "ticks" })?;
        let delta = ticks_elapsed
            .checked_mul(self.yield_per_tick)
            .ok_or(AccrualError::Overflow { quantity: "delta" })?;

        Ok(Accrual {
            ticks_elapsed,
            delta,
            new_last_updated_at,
        })
    }

    /// The instant one tick after `last_updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`AccrualError::Overflow`] at the far end of the calendar.
    pub fn next_tick_at(&self, last_updated_at: DateTime<Utc>) -> Result<DateTime<Utc>, AccrualError> {
        last_updated_at
            .checked_add_signed(self.tick_duration())
            .ok_or(AccrualError::Overflow {
                quantity: "next tick",
            })
    }
}

/// Validate the parameters and compute accrual in one step.
///
/// Convenience over [`AccrualPolicy::new`] followed by
/// [`AccrualPolicy::compute`] for callers that do not hold a policy.
///
/// # Errors
///
/// Returns [`AccrualError::InvalidConfiguration`] for bad parameters or
/// [`AccrualError::Overflow`] for unrepresentable results.
pub fn compute_accrual(
    last_updated_at: DateTime<Utc>,
    now: DateTime<Utc>,
    tick_duration: TimeDelta,
    yield_per_tick: i64,
) -> Result<Accrual, AccrualError> {
    AccrualPolicy::new(tick_duration, yield_per_tick)?.compute(last_updated_at, now)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).single().unwrap()
    }

    fn minutes(m: i64) -> DateTime<Utc> {
        t0() + TimeDelta::minutes(m)
    }

    fn fifteen_minute_policy() -> AccrualPolicy {
        AccrualPolicy::new(TimeDelta::minutes(15), 10).unwrap()
    }

    #[test]
    fn partial_tick_yields_nothing() {
        let accrual = fifteen_minute_policy().compute(t0(), minutes(14)).unwrap();
        assert_eq!(accrual.ticks_elapsed, 0);
        assert_eq!(accrual.delta, 0);
        assert_eq!(accrual.new_last_updated_at, t0());
    }

    #[test]
    fn watermark_advances_by_whole_ticks_only() {
        let accrual = fifteen_minute_policy().compute(t0(), minutes(20)).unwrap();
        assert_eq!(accrual.ticks_elapsed, 1);
        assert_eq!(accrual.delta, 10);
        assert_eq!(accrual.new_last_updated_at, minutes(15));

        let accrual = fifteen_minute_policy()
            .compute(minutes(15), minutes(50))
            .unwrap();
        assert_eq!(accrual.ticks_elapsed, 2);
        assert_eq!(accrual.delta, 20);
        assert_eq!(accrual.new_last_updated_at, minutes(45));
    }

    #[test]
    fn exact_boundary_counts_the_tick() {
        let accrual = fifteen_minute_policy().compute(t0(), minutes(30)).unwrap();
        assert_eq!(accrual.ticks_elapsed, 2);
        assert_eq!(accrual.new_last_updated_at, minutes(30));
    }

    #[test]
    fn two_hours_offline_catches_up_eight_ticks() {
        let accrual = fifteen_minute_policy().compute(t0(), minutes(120)).unwrap();
        assert_eq!(accrual.ticks_elapsed, 8);
        assert_eq!(accrual.delta, 80);
    }

    #[test]
    fn split_calls_accrue_the_same_as_one_call() {
        let policy = fifteen_minute_policy();
        let mut watermark = t0();
        let mut total = 0_u64;
        for m in [7, 16, 29, 31, 44, 46, 89, 100] {
            let accrual = policy.compute(watermark, minutes(m)).unwrap();
            total += accrual.delta;
            watermark = accrual.new_last_updated_at;
        }
        let single = policy.compute(t0(), minutes(100)).unwrap();
        assert_eq!(total, single.delta);
        assert_eq!(watermark, single.new_last_updated_at);
    }

    #[test]
    fn backward_clock_is_a_no_op() {
        let accrual = fifteen_minute_policy()
            .compute(minutes(45), minutes(10))
            .unwrap();
        assert_eq!(accrual.ticks_elapsed, 0);
        assert_eq!(accrual.delta, 0);
        assert_eq!(accrual.new_last_updated_at, minutes(45));
    }

    #[test]
    fn zero_yield_still_advances_watermark() {
        let policy = AccrualPolicy::new(TimeDelta::minutes(15), 0).unwrap();
        let accrual = policy.compute(t0(), minutes(31)).unwrap();
        assert_eq!(accrual.ticks_elapsed, 2);
        assert_eq!(accrual.delta, 0);
        assert_eq!(accrual.new_last_updated_at, minutes(30));
    }

    #[test]
    fn rejects_non_positive_tick() {
        for tick in [TimeDelta::zero(), TimeDelta::minutes(-15), TimeDelta::nanoseconds(500)] {
            assert!(matches!(
                AccrualPolicy::new(tick, 10),
                Err(AccrualError::InvalidConfiguration { .. })
            ));
        }
        assert!(AccrualPolicy::from_secs(0, 10).is_err());
    }

    #[test]
    fn rejects_negative_yield() {
        assert!(matches!(
            AccrualPolicy::from_secs(900, -1),
            Err(AccrualError::InvalidConfiguration { .. })
        ));
        assert!(compute_accrual(t0(), minutes(30), TimeDelta::minutes(15), -5).is_err());
    }

    #[test]
    fn huge_yield_overflows_instead_of_wrapping() {
        let policy = AccrualPolicy::new(TimeDelta::minutes(15), i64::MAX).unwrap();
        assert_eq!(
            policy.compute(t0(), minutes(45)),
            Err(AccrualError::Overflow { quantity: "delta" })
        );
    }

    #[test]
    fn next_tick_is_one_tick_after_watermark() {
        let policy = fifteen_minute_policy();
        assert_eq!(policy.next_tick_at(minutes(45)).unwrap(), minutes(60));
        assert_eq!(policy.tick_duration(), TimeDelta::minutes(15));
        assert_eq!(policy.yield_per_tick(), 10);
    }

    #[test]
    fn free_function_matches_policy() {
        let direct = compute_accrual(t0(), minutes(50), TimeDelta::minutes(15), 10).unwrap();
        assert_eq!(direct, fifteen_minute_policy().compute(t0(), minutes(50)).unwrap());
    }
}
