//! Shared application state for the regeneration endpoint.

use regen_core::RegenerationService;

/// Shared state injected into handlers via Axum's `State` extractor.
///
/// Holds no per-user data: every request goes through the
/// [`RegenerationService`] and its balance store.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The regeneration engine.
    pub service: RegenerationService,
}

impl AppState {
    /// Wrap a configured service.
    pub const fn new(service: RegenerationService) -> Self {
        Self { service }
    }
}
