//! HTTP handlers for the regeneration endpoint.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/users/{fid}/regenerate` | Apply elapsed ticks, return the outcome |
//! | `GET` | `/api/users/{fid}/balance` | Committed balance plus pending ticks |
//! | `GET` | `/health` | Liveness probe |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use regen_types::{BalanceView, Fid, RegenerationOutcome};

use crate::error::ApiError;
use crate::state::AppState;

/// Parse the `{fid}` path segment.
fn parse_fid(raw: &str) -> Result<Fid, ApiError> {
    raw.parse().map_err(|e| ApiError::InvalidFid(format!("{e}")))
}

/// Apply every whole tick elapsed since the user's watermark.
///
/// Called by the mini-app poller. Unknown users are initialized with a
/// zero balance and get `intervalsElapsed = 0`.
pub async fn regenerate(
    State(state): State<Arc<AppState>>,
    Path(fid): Path<String>,
) -> Result<Json<RegenerationOutcome>, ApiError> {
    let fid = parse_fid(&fid)?;
    let outcome = state.service.regenerate_now(fid).await?;
    Ok(Json(outcome))
}

/// Report the committed balance and how many ticks are waiting.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(fid): Path<String>,
) -> Result<Json<BalanceView>, ApiError> {
    let fid = parse_fid(&fid)?;
    state
        .service
        .balance_now(fid)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no balance for fid {fid}")))
}

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
