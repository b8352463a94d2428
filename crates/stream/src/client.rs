//! Shared Redis connection handling.

use numwatch_core::{Error, Result};
use redis::aio::ConnectionManager;
use tracing::info;

use crate::config::RedisConfig;

/// Thin wrapper around a multiplexed Redis connection manager.
///
/// `ConnectionManager` reconnects internally, so one clone-able handle is
/// shared by producers, consumers, and the cache.
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
    config: RedisConfig,
}

impl RedisClient {
    /// Connects to Redis and builds the shared connection manager.
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| Error::stream(format!("invalid redis url: {e}")))?;

        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::stream(format!("failed to connect to redis: {e}")))?;

        info!(url = %config.url, "Connected to Redis");

        Ok(Self { manager, config })
    }

    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}
