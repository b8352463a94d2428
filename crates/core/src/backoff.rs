//! Exponential backoff with jitter for provider retries.

use std::time::Duration;

use rand::Rng;

use crate::limits::{BACKOFF_BASE_MS, BACKOFF_MAX_MS};

/// Delay before retry `attempt` (0-based): `base * 2^attempt`, capped, plus
/// up to 1s of jitter against thundering herds.
pub fn backoff_delay(attempt: u32) -> Duration {
    backoff_delay_with(attempt, BACKOFF_BASE_MS, BACKOFF_MAX_MS)
}

pub fn backoff_delay_with(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(20)).min(max_ms);
    let jitter = rand::thread_rng().gen_range(0..1_000);
    Duration::from_millis(exp + jitter)
}
