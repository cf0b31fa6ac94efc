//! Error types for the server binary.
//!
//! [`ServiceError`] wraps every failure mode during startup and serving so
//! `main` can propagate with `?`.

/// Top-level error for the server binary.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: regen_core::ConfigError,
    },

    /// Tick length or yield are invalid. Fatal before any request is served.
    #[error("regeneration settings rejected: {source}")]
    Accrual {
        /// The underlying validation error.
        #[from]
        source: regen_core::AccrualError,
    },

    /// Database connection or migration failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying data layer error.
        #[from]
        source: regen_db::DbError,
    },

    /// The HTTP server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: regen_api::ServerError,
    },
}
