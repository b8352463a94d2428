//! Per-job aggregate statistics.
//!
//! The aggregator recomputes these from item state rather than incrementing
//! counters off progress events, so redelivered or lost events cannot skew
//! the totals.

use serde::{Deserialize, Serialize};

use crate::job::JobItem;
use crate::status::{Platform, TgStatus, WaStatus};

/// WhatsApp status histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaSummary {
    pub registered: u64,
    pub not_registered: u64,
    pub business_active: u64,
    pub unknown: u64,
}

/// Telegram status histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TgSummary {
    pub registered: u64,
    pub not_registered: u64,
    pub unknown: u64,
}

/// Per-platform status histograms, stored on the job row and surfaced in
/// every progress snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub wa: WaSummary,
    pub tg: TgSummary,
}

impl Summary {
    pub fn record_wa(&mut self, status: WaStatus) {
        match status {
            WaStatus::Registered => self.wa.registered += 1,
            WaStatus::NotRegistered => self.wa.not_registered += 1,
            WaStatus::BusinessActive => self.wa.business_active += 1,
            WaStatus::Unknown => self.wa.unknown += 1,
        }
    }

    pub fn record_tg(&mut self, status: TgStatus) {
        match status {
            TgStatus::Registered => self.tg.registered += 1,
            TgStatus::NotRegistered => self.tg.not_registered += 1,
            TgStatus::Unknown => self.tg.unknown += 1,
        }
    }
}

/// Job-level aggregates derived from the full item set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
    pub summary: Summary,
}

/// Recomputes job aggregates from item state. Pure, order-independent.
pub fn compute_stats(items: &[JobItem], platforms: &[Platform]) -> JobStats {
    let mut stats = JobStats::default();

    for item in items {
        if item.is_processed(platforms) {
            stats.processed += 1;
            if item.is_success(platforms) {
                stats.success += 1;
            }
        }
        if item.error.is_some() {
            stats.failed += 1;
        }
        if let Some(wa) = item.wa_status {
            stats.summary.record_wa(wa);
        }
        if let Some(tg) = item.tg_status {
            stats.summary.record_tg(tg);
        }
    }

    stats
}
