//! Redis configuration.

use serde::{Deserialize, Serialize};

/// Redis connection and stream tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL
    pub url: String,
    /// Messages fetched per XREADGROUP call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Bounded blocking wait per read, so workers can poll shutdown
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
    /// Approximate stream length bound passed to XADD
    #[serde(default = "default_maxlen")]
    pub stream_maxlen: usize,
    /// Idle time before a pending message is reclaimed from a dead consumer
    #[serde(default = "default_claim_idle_ms")]
    pub claim_idle_ms: u64,
}

fn default_batch_size() -> usize {
    10
}

fn default_block_ms() -> u64 {
    numwatch_core::limits::STREAM_BLOCK_MS
}

fn default_maxlen() -> usize {
    numwatch_core::limits::STREAM_MAXLEN
}

fn default_claim_idle_ms() -> u64 {
    numwatch_core::limits::STALE_CLAIM_IDLE_MS
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            batch_size: default_batch_size(),
            block_ms: default_block_ms(),
            stream_maxlen: default_maxlen(),
            claim_idle_ms: default_claim_idle_ms(),
        }
    }
}
