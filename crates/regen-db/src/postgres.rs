//! Opening the balance database.
//!
//! [`Database::open`] is the single entry point: it sizes the pool from
//! [`InfrastructureConfig`], then brings `user_balances` up to date. A
//! handle therefore always points at a schema [`PgBalanceStore`] can use.
//!
//! Queries are built at runtime (not compile-time checked) so building the
//! workspace never needs a live database.

use std::time::Duration;

use regen_core::config::InfrastructureConfig;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::balance_store::PgBalanceStore;
use crate::error::DbError;

/// A poll request waits at most this long for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle connections are dropped after this long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Migrated connection pool for the regeneration service.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect with `infra.max_connections` connections and migrate.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] for an unparseable `postgres_url`,
    /// [`DbError::Postgres`] if no connection can be made, and
    /// [`DbError::Migration`] if the schema cannot be brought up to date.
    pub async fn open(infra: &InfrastructureConfig) -> Result<Self, DbError> {
        let options: PgConnectOptions = infra
            .postgres_url
            .parse()
            .map_err(|e: sqlx::Error| DbError::Config(format!("invalid postgres_url: {e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(infra.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(IDLE_TIMEOUT)
            .connect_with(options)
            .await?;
        tracing::info!(
            max_connections = infra.max_connections,
            "Connected to PostgreSQL"
        );

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("user_balances schema is current");

        Ok(Self { pool })
    }

    /// A [`PgBalanceStore`] sharing this pool.
    pub fn balance_store(&self) -> PgBalanceStore {
        PgBalanceStore::new(self.pool.clone())
    }

    /// Wait for in-flight queries, then close every connection.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_url_is_a_config_error() {
        let infra = InfrastructureConfig {
            postgres_url: "not a url".to_owned(),
            ..InfrastructureConfig::default()
        };
        let result = Database::open(&infra).await;
        assert!(matches!(result, Err(DbError::Config(_))));
    }
}
