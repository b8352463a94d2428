//! Postgres liveness probe feeding the global health registry.

use numwatch_core::{Error, Result};
use telemetry::health;
use tracing::warn;

use crate::client::PgClient;

/// Runs a trivial query and records the outcome.
pub async fn check(client: &PgClient) -> Result<()> {
    match sqlx::query("SELECT 1").execute(client.pool()).await {
        Ok(_) => {
            health().postgres.set_healthy();
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Postgres health check failed");
            health().postgres.set_unhealthy(e.to_string());
            Err(Error::store(format!("SELECT 1 failed: {e}")))
        }
    }
}
