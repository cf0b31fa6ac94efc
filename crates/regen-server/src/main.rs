//! Server binary for the `cxBalance` regeneration service.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `regen-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Validate tick length and yield -- invalid values abort here
//! 4. Open the balance store (`PostgreSQL` with migrations, or in-memory)
//! 5. Serve the regeneration API until `Ctrl-C`

mod error;

use std::path::Path;
use std::sync::Arc;

use regen_api::{AppState, ServerConfig};
use regen_core::config::LoggingConfig;
use regen_core::{
    BalanceStore, MemoryBalanceStore, RegenConfig, RegenerationService, StoreBackend, SystemClock,
};
use regen_db::Database;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::ServiceError;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "regen-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step or the server fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is not up yet, so report the source after init.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(from_file, path = CONFIG_PATH, "regen-server starting");

    // 3. Validate accrual settings.
    let policy = config.regeneration.policy().map_err(ServiceError::from)?;
    info!(
        tick_duration_secs = config.regeneration.tick_duration_secs,
        yield_per_tick = policy.yield_per_tick(),
        max_commit_attempts = config.regeneration.max_commit_attempts,
        "Regeneration policy loaded"
    );

    // 4. Open the balance store.
    let (store, database): (Arc<dyn BalanceStore>, Option<Database>) =
        match config.infrastructure.store {
            StoreBackend::Postgres => {
                let database = Database::open(&config.infrastructure)
                    .await
                    .map_err(ServiceError::from)?;
                (Arc::new(database.balance_store()), Some(database))
            }
            StoreBackend::Memory => {
                warn!("Using in-memory balance store; balances reset on restart");
                (Arc::new(MemoryBalanceStore::new()), None)
            }
        };

    let service = RegenerationService::new(
        store,
        Arc::new(SystemClock),
        policy,
    )
    .with_max_commit_attempts(config.regeneration.max_commit_attempts);
    let state = Arc::new(AppState::new(service));

    // 5. Serve.
    let server_config = ServerConfig {
        host: config.infrastructure.host.clone(),
        port: config.infrastructure.port,
    };
    regen_api::start_server(&server_config, state, shutdown_signal())
        .await
        .map_err(ServiceError::from)?;

    if let Some(database) = database {
        database.close().await;
    }
    info!("regen-server shutdown complete");
    Ok(())
}

/// Load `regen-config.yaml`, falling back to defaults when absent.
///
/// Environment overrides apply in both cases.
fn load_config() -> Result<(RegenConfig, bool), ServiceError> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        return Ok((RegenConfig::from_file(path)?, true));
    }
    let mut config = RegenConfig::default();
    config.infrastructure.apply_env_overrides()?;
    Ok((config, false))
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolve when the process receives `Ctrl-C`.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
