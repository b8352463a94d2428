//! Postgres pool wrapper.

use std::time::Duration;

use numwatch_core::{Error, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::PostgresConfig;
use crate::schema;

/// Shared connection pool. Clone-able; all repositories borrow it.
#[derive(Clone)]
pub struct PgClient {
    pool: PgPool,
    config: PostgresConfig,
}

impl PgClient {
    /// Connects the pool. Does not touch the schema; call
    /// [`ensure_schema`](Self::ensure_schema) once at startup.
    pub async fn connect(config: PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| Error::store(format!("failed to connect to postgres: {e}")))?;

        info!(
            max_connections = config.max_connections,
            "Connected to Postgres"
        );

        Ok(Self { pool, config })
    }

    /// Applies the idempotent DDL.
    pub async fn ensure_schema(&self) -> Result<()> {
        for ddl in schema::ALL_TABLES {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::store(format!("schema setup failed: {e}")))?;
        }
        info!("Schema ensured");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}
