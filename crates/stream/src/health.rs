//! Redis liveness probe feeding the global health registry.

use numwatch_core::{Error, Result};
use telemetry::health;
use tracing::warn;

use crate::client::RedisClient;

/// PINGs the server and records the outcome.
pub async fn check(client: &RedisClient) -> Result<()> {
    let mut conn = client.connection();
    let pong: std::result::Result<String, redis::RedisError> =
        redis::cmd("PING").query_async(&mut conn).await;

    match pong {
        Ok(_) => {
            health().redis.set_healthy();
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Redis health check failed");
            health().redis.set_unhealthy(e.to_string());
            Err(Error::stream(format!("PING failed: {e}")))
        }
    }
}
