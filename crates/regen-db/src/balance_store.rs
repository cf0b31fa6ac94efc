//! `PostgreSQL` implementation of [`BalanceStore`].
//!
//! One row per user in `user_balances`. The compare-and-swap commit is a
//! single conditional `UPDATE`, so balance and watermark change together
//! in one statement or not at all, even if the client disconnects while
//! the query is in flight.
//!
//! | Operation | Statement |
//! |-----------|-----------|
//! | first touch | `INSERT .. ON CONFLICT (fid) DO NOTHING RETURNING ..` |
//! | read | `SELECT .. WHERE fid = $1` |
//! | commit | `UPDATE .. WHERE fid = $1 AND last_updated_at = $expected` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regen_core::{BalanceStore, Loaded, StoreError};
use regen_types::{Fid, UserBalance};
use sqlx::PgPool;

use crate::error::DbError;

/// Operations on the `user_balances` table.
#[derive(Clone)]
pub struct PgBalanceStore {
    pool: PgPool,
}

impl PgBalanceStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a zero-balance row unless one exists, then return the row.
    ///
    /// `ON CONFLICT DO NOTHING` makes concurrent first touches agree on the
    /// row written by whichever insert landed first.
    async fn insert_or_get(&self, fid: Fid, now: DateTime<Utc>) -> Result<Loaded, DbError> {
        let fid_db = fid_to_db(fid)?;

        let inserted = sqlx::query_as::<_, BalanceRow>(
            r"INSERT INTO user_balances (fid, balance, last_updated_at, created_at)
              VALUES ($1, 0, $2, $2)
              ON CONFLICT (fid) DO NOTHING
              RETURNING fid, balance, last_updated_at",
        )
        .bind(fid_db)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            tracing::debug!(%fid, "Created balance row");
            return Ok(Loaded {
                balance: row.try_into()?,
                created: true,
            });
        }

        let row = sqlx::query_as::<_, BalanceRow>(
            r"SELECT fid, balance, last_updated_at
              FROM user_balances
              WHERE fid = $1",
        )
        .bind(fid_db)
        .fetch_one(&self.pool)
        .await?;

        Ok(Loaded {
            balance: row.try_into()?,
            created: false,
        })
    }

    /// Conditional update; returns whether a row matched.
    async fn compare_and_swap(
        &self,
        fid: Fid,
        new_balance: u64,
        new_last_updated_at: DateTime<Utc>,
        expected_prior_last_updated_at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let balance_db = i64::try_from(new_balance).map_err(|_err| DbError::OutOfRange {
            column: "balance",
            value: new_balance.to_string(),
        })?;

        let result = sqlx::query(
            r"UPDATE user_balances
              SET balance = $2, last_updated_at = $3
              WHERE fid = $1 AND last_updated_at = $4",
        )
        .bind(fid_to_db(fid)?)
        .bind(balance_db)
        .bind(new_last_updated_at)
        .bind(expected_prior_last_updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn select(&self, fid: Fid) -> Result<Option<UserBalance>, DbError> {
        let row = sqlx::query_as::<_, BalanceRow>(
            r"SELECT fid, balance, last_updated_at
              FROM user_balances
              WHERE fid = $1",
        )
        .bind(fid_to_db(fid)?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserBalance::try_from).transpose()
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn read_and_lock(&self, fid: Fid, now: DateTime<Utc>) -> Result<Loaded, StoreError> {
        Ok(self.insert_or_get(fid, now).await?)
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
        let swapped = self
            .compare_and_swap(
                fid,
                new_balance,
                new_last_updated_at,
                expected_prior_last_updated_at,
            )
            .await?;
        if swapped {
            Ok(())
        } else {
            Err(StoreError::Conflict { fid })
        }
    }

    async fn fetch(&self, fid: Fid) -> Result<Option<UserBalance>, StoreError> {
        Ok(self.select(fid).await?)
    }
}

/// A row from the `user_balances` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BalanceRow {
    /// User fid.
    pub fid: i64,
    /// Accrued balance.
    pub balance: i64,
    /// Accrual watermark.
    pub last_updated_at: DateTime<Utc>,
}

impl TryFrom<BalanceRow> for UserBalance {
    type Error = DbError;

    fn try_from(row: BalanceRow) -> Result<Self, Self::Error> {
        let fid = u64::try_from(row.fid)
            .ok()
            .and_then(Fid::new)
            .ok_or_else(|| DbError::OutOfRange {
                column: "fid",
                value: row.fid.to_string(),
            })?;
        let balance = u64::try_from(row.balance).map_err(|_err| DbError::OutOfRange {
            column: "balance",
            value: row.balance.to_string(),
        })?;
        Ok(Self {
            fid,
            balance,
            last_updated_at: row.last_updated_at,
        })
    }
}

/// Convert a [`Fid`] to its `BIGINT` column value.
fn fid_to_db(fid: Fid) -> Result<i64, DbError> {
    i64::try_from(fid.into_inner()).map_err(|_err| DbError::OutOfRange {
        column: "fid",
        value: fid.to_string(),
    })
}
