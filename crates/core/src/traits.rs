//! Collaborator traits at the pipeline's seams.
//!
//! Production implementations: `numwatch-store` (JobStore over Postgres),
//! `numwatch-stream` (ItemPublisher and ResultCache over Redis), and the
//! worker crate's S3 export sink. Tests swap in in-memory versions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::TgAccount;
use crate::error::Result;
use crate::job::{Job, JobItem, JobStatus};
use crate::message::{BulkItemMessage, ProgressMessage, TgCheckMessage, WaStage2Message};
use crate::stats::Summary;
use crate::status::{Platform, PlatformStatus};

/// A cached check result. The status is stored in wire form because the
/// platform is implied by the cache key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedStatus {
    pub status: String,
    pub checked_at: DateTime<Utc>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl CachedStatus {
    pub fn new(status: PlatformStatus, meta: serde_json::Value) -> Self {
        Self {
            status: status.as_str().to_string(),
            checked_at: Utc::now(),
            meta,
        }
    }

    /// Re-types the stored status for the platform the key belonged to.
    pub fn status_for(&self, platform: Platform) -> Option<PlatformStatus> {
        PlatformStatus::parse(platform, &self.status)
    }
}

/// Record-of-truth store for jobs, items, Telegram accounts, and the
/// durable half of the result cache.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &Job) -> Result<()>;

    /// Bulk-creates one item per normalized number; duplicates within the
    /// job are ignored (unique on job_id + e164).
    async fn create_items(&self, job_id: &str, e164s: &[String]) -> Result<()>;

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>>;

    async fn get_item(&self, job_id: &str, e164: &str) -> Result<Option<JobItem>>;

    /// Idempotent per-platform status upsert keyed by (job_id, e164);
    /// last write wins.
    async fn update_item_status(
        &self,
        job_id: &str,
        e164: &str,
        status: PlatformStatus,
        checked_at: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<()>;

    /// Items with every requested platform status non-null.
    async fn count_processed(&self, job_id: &str, platforms: &[Platform]) -> Result<u64>;

    /// Full item set for recomputing aggregates or exporting. Ordered by
    /// e164 so exports are deterministic.
    async fn list_items(&self, job_id: &str) -> Result<Vec<JobItem>>;

    async fn update_job_progress(
        &self,
        job_id: &str,
        processed: u64,
        success: u64,
        failed: u64,
        summary: &Summary,
    ) -> Result<()>;

    /// Guarded one-directional transition: succeeds (returns true) only if
    /// the job is still in `from`. The single-writer guard for COMPLETED.
    async fn transition_job(&self, job_id: &str, from: JobStatus, to: JobStatus) -> Result<bool>;

    /// Completes a running job, stamping `finished_at` and the export URL
    /// in the same guarded write, so no observable state is Completed with
    /// a missing URL. Returns false if the job was no longer Running.
    async fn complete_with_export(&self, job_id: &str, export_url: &str) -> Result<bool>;

    /// Jobs the reconciliation sweep must look at (Pending and Running).
    async fn list_active_jobs(&self) -> Result<Vec<Job>>;

    // --- Telegram account pool ---

    async fn load_active_accounts(&self) -> Result<Vec<TgAccount>>;

    /// Successful use: stamps last_used_at, resets error_count.
    async fn record_account_success(&self, account_id: &str) -> Result<()>;

    /// Atomic error increment; deactivates the account at the threshold.
    /// Returns the new cumulative count.
    async fn record_account_error(&self, account_id: &str) -> Result<u32>;

    // --- Durable result cache (source of truth on fast-cache miss) ---

    async fn get_cached(&self, platform: Platform, e164: &str) -> Result<Option<CachedStatus>>;

    async fn put_cached(
        &self,
        platform: Platform,
        e164: &str,
        entry: &CachedStatus,
        ttl_secs: u64,
    ) -> Result<()>;
}

/// Fast result cache: key (platform, e164) → cached status with TTL.
/// Failures are absorbed (a broken cache degrades to checker calls).
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, platform: Platform, e164: &str) -> Option<CachedStatus>;

    async fn set(&self, platform: Platform, e164: &str, entry: CachedStatus, ttl_secs: u64);
}

/// Producer side of the durable stream.
#[async_trait]
pub trait ItemPublisher: Send + Sync {
    async fn publish_bulk_item(&self, msg: &BulkItemMessage) -> Result<()>;

    async fn publish_wa_stage2(&self, msg: &WaStage2Message) -> Result<()>;

    async fn publish_tg_check(&self, msg: &TgCheckMessage) -> Result<()>;

    async fn publish_progress(&self, msg: &ProgressMessage) -> Result<()>;
}

/// Object-store sink for export artifacts.
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Uploads bytes under a key; returns the storage location.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    /// Time-limited download URL for a previously uploaded key.
    async fn signed_url(&self, key: &str, expiry_secs: u64) -> Result<String>;
}
