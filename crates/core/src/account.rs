//! Telegram account pool records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::limits::TG_ACCOUNT_ERROR_THRESHOLD;

/// A provisioned Telegram account used for contact-resolution checks.
///
/// Usage and error counters live in the shared store and are mutated with
/// atomic increments, since workers in separate processes share the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgAccount {
    pub id: String,
    pub phone_label: String,
    pub api_id: String,
    pub api_hash: String,
    /// Authenticated MTProto session blob.
    pub session: String,
    pub proxy_url: Option<String>,
    pub daily_limit: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub is_active: bool,
}

impl TgAccount {
    /// Whether the cumulative error count has crossed the deactivation
    /// threshold.
    pub fn over_error_threshold(&self) -> bool {
        self.error_count >= TG_ACCOUNT_ERROR_THRESHOLD
    }
}
