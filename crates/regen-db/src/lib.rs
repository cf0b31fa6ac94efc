//! Data layer for the `cxBalance` regeneration service (`PostgreSQL`).
//!
//! Provides the durable [`BalanceStore`](regen_core::BalanceStore): one row
//! per user holding the balance and its accrual watermark, updated with a
//! conditional `UPDATE` that acts as the compare-and-swap primitive.
//!
//! # Modules
//!
//! - [`postgres`] -- [`Database`]: pool sizing and the `user_balances` migration
//! - [`balance_store`] -- [`PgBalanceStore`] over the `user_balances` table
//! - [`error`] -- Shared error types

pub mod balance_store;
pub mod error;
pub mod postgres;

pub use balance_store::{BalanceRow, PgBalanceStore};
pub use error::DbError;
pub use postgres::Database;
