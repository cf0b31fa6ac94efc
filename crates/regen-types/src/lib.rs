//! Shared type definitions for the `cxBalance` regeneration service.
//!
//! Types defined here are used by every crate in the workspace and flow to
//! `TypeScript` via `ts-rs` for the mini-app client that polls the
//! regeneration endpoint.
//!
//! # Modules
//!
//! - [`ids`] -- The [`Fid`] user identifier
//! - [`structs`] -- Balance records and endpoint payloads

pub mod ids;
pub mod structs;

pub use ids::{Fid, ParseFidError};
pub use structs::{BalanceView, RegenerationOutcome, UserBalance};
