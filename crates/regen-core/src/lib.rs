//! Resource regeneration engine for the `cxBalance` mini-app.
//!
//! Each user holds a balance that accrues a fixed yield every tick of
//! wall-clock time. There are no server-side timers: a client poller calls
//! in at whatever cadence it manages, and every call recomputes how many
//! whole ticks have passed since the stored watermark.
//!
//! # Architecture
//!
//! ```text
//! poller -> RegenerationService::regenerate(fid, now)
//!               |
//!               +-- BalanceStore::read_and_lock   (create on first touch)
//!               +-- AccrualPolicy::compute        (pure)
//!               +-- BalanceStore::commit          (compare-and-swap, retried)
//! ```
//!
//! # Modules
//!
//! - [`clock`] -- Injectable wall-clock sources
//! - [`accrual`] -- Whole-tick accrual arithmetic
//! - [`store`] -- Balance store contract and in-memory implementation
//! - [`service`] -- Read-compute-commit orchestration with bounded retry
//! - [`config`] -- YAML configuration with environment overrides

pub mod accrual;
pub mod clock;
pub mod config;
pub mod service;
pub mod store;

pub use accrual::{Accrual, AccrualError, AccrualPolicy, compute_accrual};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, RegenConfig, StoreBackend};
pub use service::{DEFAULT_MAX_COMMIT_ATTEMPTS, RegenerationError, RegenerationService};
pub use store::{BalanceStore, Loaded, MemoryBalanceStore, StoreError};
