//! Balance store contract and the in-memory implementation.
//!
//! A [`BalanceStore`] owns one [`UserBalance`] per user and offers a single
//! write primitive: a compare-and-swap on the watermark. Two requests that
//! read the same stale watermark cannot both commit; the loser gets
//! [`StoreError::Conflict`] and must redo its read-compute-write cycle.
//!
//! The durable implementation lives in `regen-db`. [`MemoryBalanceStore`]
//! is used by tests and for running without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regen_types::{Fid, UserBalance};
use tokio::sync::Mutex;

/// Errors surfaced by a [`BalanceStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The stored watermark no longer matches the expected prior value.
    #[error("concurrent update detected for fid {fid}")]
    Conflict {
        /// The user whose record changed underneath the caller.
        fid: Fid,
    },

    /// A commit tried to move the watermark backwards.
    #[error("watermark for fid {fid} would move backwards")]
    WatermarkRegression {
        /// The user whose commit was rejected.
        fid: Fid,
    },

    /// The underlying storage failed.
    #[error("balance store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A record returned by [`BalanceStore::read_and_lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loaded {
    /// The current committed state.
    pub balance: UserBalance,
    /// Whether this call created the record.
    pub created: bool,
}

/// Durable per-user balance storage with compare-and-swap commits.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Load the record for `fid`, creating it when absent.
    ///
    /// A missing user is initialized with a zero balance and a watermark of
    /// `now`; concurrent first touches must agree on a single record. No
    /// lock is held after the call returns: the watermark in the returned
    /// record is the version to pass to [`BalanceStore::commit`].
    async fn read_and_lock(&self, fid: Fid, now: DateTime<Utc>) -> Result<Loaded, StoreError>;

    /// Atomically write a new balance and watermark.
    ///
    /// Succeeds only if the stored watermark still equals
    /// `expected_prior_last_updated_at`. Balance and watermark are written
    /// together or not at all.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the watermark has moved,
    /// [`StoreError::WatermarkRegression`] when the new watermark is older
    /// than the expected one.
    async fn commit(
        &self,
        fid: Fid,
        new_balance: u64,
        new_last_updated_at: DateTime<Utc>,
        expected_prior_last_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Read the record for `fid` without creating it.
    async fn fetch(&self, fid: Fid) -> Result<Option<UserBalance>, StoreError>;
}

/// [`BalanceStore`] held in process memory.
#[derive(Debug, Default)]
pub struct MemoryBalanceStore {
    records: Mutex<HashMap<Fid, UserBalance>>,
}

impl MemoryBalanceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record directly, bypassing the commit check.
    ///
    /// Used to seed state (for example, restoring an exported snapshot).
    pub async fn insert(&self, record: UserBalance) {
        self.records.lock().await.insert(record.fid, record);
    }

    /// Number of users with a record.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether no user has a record yet.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn read_and_lock(&self, fid: Fid, now: DateTime<Utc>) -> Result<Loaded, StoreError> {
        let mut records = self.records.lock().await;
        if let Some(existing) = records.get(&fid) {
            return Ok(Loaded {
                balance: *existing,
                created: false,
            });
        }
        let record = UserBalance::initial(fid, now);
        records.insert(fid, record);
        Ok(Loaded {
            balance: record,
            created: true,
        })
    }

    async fn commit(
        &self,
        fid: Fid,
        new_balance: u64,
        new_last_updated_at: DateTime<Utc>,
        expected_prior_last_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if new_last_updated_at < expected_prior_last_updated_at {
            return Err(StoreError::WatermarkRegression { fid });
        }
        let mut records = self.records.lock().await;
        match records.get_mut(&fid) {
            Some(record) if record.last_updated_at == expected_prior_last_updated_at => {
                record.balance = new_balance;
                record.last_updated_at = new_last_updated_at;
                Ok(())
            }
            _ => Err(StoreError::Conflict { fid }),
        }
    }

    async fn fetch(&self, fid: Fid) -> Result<Option<UserBalance>, StoreError> {
        Ok(self.records.lock().await.get(&fid).copied())
    }
}
