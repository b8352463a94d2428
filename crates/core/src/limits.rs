//! Operational limits and timing constants for the numwatch engine.
//!
//! Centralized so the checkers, workers, and API agree on the same numbers.
//! The `#[validate]` derive macro requires literal values in attributes, so
//! request-size limits are duplicated there. Keep both in sync when modifying.

/// Maximum numbers accepted by a synchronous quick check.
pub const MAX_QUICK_NUMBERS: usize = 100;

/// Maximum numbers accepted by a bulk job.
pub const MAX_BULK_NUMBERS: usize = 1_000_000;

/// Result cache TTL (7 days), both the Redis fast layer and the durable copy.
pub const CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Stage 1 (wa.me heuristic probe) timeout.
pub const WA_STAGE1_TIMEOUT_MS: u64 = 5_000;

/// Stage 2 (paid verification API) timeout.
pub const WA_STAGE2_TIMEOUT_MS: u64 = 10_000;

/// Bounded attempts for stage 2 and for the Telegram account rotation.
pub const MAX_CHECK_ATTEMPTS: u32 = 3;

/// Exponential backoff base delay.
pub const BACKOFF_BASE_MS: u64 = 1_000;

/// Exponential backoff cap.
pub const BACKOFF_MAX_MS: u64 = 30_000;

/// Cumulative errors after which a Telegram account is deactivated.
pub const TG_ACCOUNT_ERROR_THRESHOLD: u32 = 10;

/// Aggregator reconciliation sweep interval.
pub const SWEEP_INTERVAL_SECS: u64 = 5;

/// Bounded blocking wait on stream reads, so workers can poll shutdown.
pub const STREAM_BLOCK_MS: u64 = 1_000;

/// Outer-loop pause after a systemic failure (store/stream unreachable).
pub const SYSTEMIC_RETRY_MS: u64 = 1_000;

/// Idle time after which unacknowledged stream messages are reclaimed.
pub const STALE_CLAIM_IDLE_MS: u64 = 60_000;

/// Signed export URL lifetime (24 hours).
pub const EXPORT_URL_EXPIRY_SECS: u64 = 24 * 60 * 60;

/// Approximate stream length bound passed to XADD (`MAXLEN ~`).
pub const STREAM_MAXLEN: usize = 1_000_000;
