//! Balance records and the payloads returned to the mini-app poller.
//!
//! Wire types use `camelCase` field names because their only consumer is
//! the `TypeScript` client, which imports the generated bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::Fid;

// ---------------------------------------------------------------------------
// UserBalance
// ---------------------------------------------------------------------------

/// Durable per-user balance state.
///
/// `last_updated_at` is the watermark: accrual has been applied for every
/// whole tick up to this instant and for none after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct UserBalance {
    /// The user this record belongs to.
    pub fid: Fid,
    /// Accrued `cxBalance`.
    #[ts(type = "number")]
    pub balance: u64,
    /// Watermark of the last applied tick boundary.
    pub last_updated_at: DateTime<Utc>,
}

impl UserBalance {
    /// A fresh zero-balance record whose watermark starts at `now`.
    pub const fn initial(fid: Fid, now: DateTime<Utc>) -> Self {
        Self {
            fid,
            balance: 0,
            last_updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// RegenerationOutcome
// ---------------------------------------------------------------------------

/// Result of one regeneration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct RegenerationOutcome {
    /// The user that was regenerated.
    pub fid: Fid,
    /// Whole ticks applied by this call (0 for a no-op or first touch).
    #[ts(type = "number")]
    pub intervals_elapsed: u64,
    /// Balance after this call.
    #[ts(type = "number")]
    pub balance: u64,
    /// Watermark after this call.
    pub last_updated_at: DateTime<Utc>,
    /// Earliest instant at which another tick becomes available.
    pub next_tick_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// BalanceView
// ---------------------------------------------------------------------------

/// Read-only projection of a user's balance.
///
/// `pending_intervals` counts ticks that have elapsed but not yet been
/// committed; the next regeneration call will apply them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    /// The user being viewed.
    pub fid: Fid,
    /// Committed balance.
    #[ts(type = "number")]
    pub balance: u64,
    /// Committed watermark.
    pub last_updated_at: DateTime<Utc>,
    /// Elapsed ticks not yet applied.
    #[ts(type = "number")]
    pub pending_intervals: u64,
    /// Earliest instant at which another tick becomes available.
    pub next_tick_at: DateTime<Utc>,
}
