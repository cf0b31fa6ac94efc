//! The regeneration service: read, accrue, compare-and-swap, retry.
//!
//! # Algorithm
//!
//! ```text
//! loop (at most max_commit_attempts times)
//!     record  = store.read_and_lock(fid, now)      -- creates if absent
//!     created?              -> return 0 intervals
//!     accrual = policy.compute(record.watermark, now)
//!     no whole tick yet?    -> return 0 intervals, no write
//!     store.commit(balance + delta, new watermark, expected = record.watermark)
//!         ok       -> return ticks applied
//!         conflict -> another request committed first; start over
//! attempts exhausted -> Contention
//! ```
//!
//! A request that loses the race re-reads the advanced watermark and finds
//! fewer (usually zero) ticks left to apply, so elapsed ticks are never
//! double-counted no matter how many pollers fire at once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regen_types::{BalanceView, Fid, RegenerationOutcome, UserBalance};
use tracing::{debug, info, warn};

use crate::accrual::{AccrualError, AccrualPolicy};
use crate::clock::{Clock, to_storage_precision};
use crate::store::{BalanceStore, Loaded, StoreError};

/// Default number of read-compute-commit cycles before giving up.
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Errors returned by [`RegenerationService`].
#[derive(Debug, thiserror::Error)]
pub enum RegenerationError {
    /// Every commit attempt lost a compare-and-swap race.
    ///
    /// Nothing was written by this call; the ticks remain computable from
    /// the stored watermark and will be applied by a later request.
    #[error("fid {fid} is contended: {attempts} commit attempts conflicted")]
    Contention {
        /// The contended user.
        fid: Fid,
        /// How many attempts were made.
        attempts: u32,
    },

    /// The balance store failed for a reason other than a conflict.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The accrual arithmetic could not be represented.
    #[error(transparent)]
    Accrual(#[from] AccrualError),
}

/// Applies elapsed ticks to user balances exactly once.
#[derive(Clone)]
pub struct RegenerationService {
    store: Arc<dyn BalanceStore>,
    clock: Arc<dyn Clock>,
    policy: AccrualPolicy,
    max_commit_attempts: u32,
}

impl std::fmt::Debug for RegenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegenerationService")
            .field("policy", &self.policy)
            .field("max_commit_attempts", &self.max_commit_attempts)
            .finish_non_exhaustive()
    }
}

impl RegenerationService {
    /// Create a service over `store`, reading time from `clock`.
    pub fn new(store: Arc<dyn BalanceStore>, clock: Arc<dyn Clock>, policy: AccrualPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }

    /// Set the commit attempt budget (values below 1 are treated as 1).
    #[must_use]
    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }

    /// The accrual policy in use.
    pub const fn policy(&self) -> &AccrualPolicy {
        &self.policy
    }

    /// Regenerate `fid` at the injected clock's current time.
    ///
    /// # Errors
    ///
    /// See [`RegenerationService::regenerate`].
    pub async fn regenerate_now(&self, fid: Fid) -> Result<RegenerationOutcome, RegenerationError> {
        self.regenerate(fid, self.clock.now()).await
    }

    /// Apply every whole tick elapsed between the stored watermark and `now`.
    ///
    /// # Errors
    ///
    /// Returns [`RegenerationError::Contention`] when all commit attempts
    /// conflict, [`RegenerationError::Store`] for storage failures and
    /// [`RegenerationError::Accrual`] for arithmetic overflow. No error
    /// leaves a partially applied balance behind.
    pub async fn regenerate(
        &self,
        fid: Fid,
        now: DateTime<Utc>,
    ) -> Result<RegenerationOutcome, RegenerationError> {
        let now = to_storage_precision(now);
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);

            let Loaded {
                balance: record,
                created,
            } = self.store.read_and_lock(fid, now).await?;

            if created {
                debug!(%fid, "Initialized balance record");
                let next_tick_at = self.policy.next_tick_at(record.last_updated_at)?;
                return Ok(outcome(record, 0, next_tick_at));
            }

            let accrual = self.policy.compute(record.last_updated_at, now)?;
            if accrual.ticks_elapsed == 0 {
                debug!(%fid, balance = record.balance, "No whole tick elapsed");
                let next_tick_at = self.policy.next_tick_at(record.last_updated_at)?;
                return Ok(outcome(record, 0, next_tick_at));
            }

            // Everything fallible happens before the write.
            let new_balance = record
                .balance
                .checked_add(accrual.delta)
                .ok_or(AccrualError::Overflow { quantity: "balance" })?;
            let next_tick_at = self.policy.next_tick_at(accrual.new_last_updated_at)?;

            match self
                .store
                .commit(
                    fid,
                    new_balance,
                    accrual.new_last_updated_at,
                    record.last_updated_at,
                )
                .await
            {
                Ok(()) => {
                    info!(
                        %fid,
                        ticks = accrual.ticks_elapsed,
                        delta = accrual.delta,
                        balance = new_balance,
                        attempts,
                        "Applied regeneration ticks"
                    );
                    let committed = UserBalance {
                        fid,
                        balance: new_balance,
                        last_updated_at: accrual.new_last_updated_at,
                    };
                    return Ok(outcome(committed, accrual.ticks_elapsed, next_tick_at));
                }
                Err(StoreError::Conflict { .. }) if attempts < self.max_commit_attempts => {
                    debug!(%fid, attempts, "Commit conflicted, retrying");
                }
                Err(StoreError::Conflict { .. }) => {
                    warn!(%fid, attempts, "Commit retries exhausted");
                    return Err(RegenerationError::Contention { fid, attempts });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read-only view of `fid` at `now`, or `None` if the user was never seen.
    ///
    /// Reports the ticks a regeneration at `now` would apply without
    /// committing them.
    ///
    /// # Errors
    ///
    /// Returns [`RegenerationError::Store`] or [`RegenerationError::Accrual`].
    pub async fn balance(
        &self,
        fid: Fid,
        now: DateTime<Utc>,
    ) -> Result<Option<BalanceView>, RegenerationError> {
        let Some(record) = self.store.fetch(fid).await? else {
            return Ok(None);
        };
        let accrual = self
            .policy
            .compute(record.last_updated_at, to_storage_precision(now))?;
        Ok(Some(BalanceView {
            fid,
            balance: record.balance,
            last_updated_at: record.last_updated_at,
            pending_intervals: accrual.ticks_elapsed,
            next_tick_at: self.policy.next_tick_at(record.last_updated_at)?,
        }))
    }

    /// Read-only view of `fid` at the injected clock's current time.
    ///
    /// # Errors
    ///
    /// See [`RegenerationService::balance`].
    pub async fn balance_now(&self, fid: Fid) -> Result<Option<BalanceView>, RegenerationError> {
        self.balance(fid, self.clock.now()).await
    }

}

const fn outcome(
    record: UserBalance,
    intervals_elapsed: u64,
    next_tick_at: DateTime<Utc>,
) -> RegenerationOutcome {
    RegenerationOutcome {
        fid: record.fid,
        intervals_elapsed,
        balance: record.balance,
        last_updated_at: record.last_updated_at,
        next_tick_at,
    }
}
