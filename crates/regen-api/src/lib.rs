//! HTTP surface of the `cxBalance` regeneration service.
//!
//! This crate provides an Axum server exposing the regeneration trigger
//! polled by the mini-app, a read-only balance view, and a health probe.
//! All state lives behind [`RegenerationService`](regen_core::RegenerationService);
//! the handlers only parse paths and map errors to status codes.
//!
//! | Failure | Status |
//! |---------|--------|
//! | malformed or zero fid | `400` |
//! | unknown fid (balance view only) | `404` |
//! | commit retries exhausted | `503` + `Retry-After` |
//! | store failure | `500` |

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
