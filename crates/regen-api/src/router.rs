//! Axum router construction for the regeneration endpoint.
//!
//! CORS allows any origin: the mini-app runs inside a frame served from
//! the social client's domain, not ours.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// - `POST /api/users/{fid}/regenerate`
/// - `GET /api/users/{fid}/balance`
/// - `GET /health`
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/users/{fid}/regenerate", post(handlers::regenerate))
        .route("/api/users/{fid}/balance", get(handlers::get_balance))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
