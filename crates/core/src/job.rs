//! Job and job-item records: the durable state the pipeline converges on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::stats::Summary;
use crate::status::{Platform, TgStatus, WaStatus};

/// Lifecycle of a bulk job. Transitions are one-directional:
/// PENDING → RUNNING → {COMPLETED | FAILED | CANCELED}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(Error::validation(format!("unknown job status: {other}"))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Legal one-directional transitions.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending, Self::Canceled) => true,
            (Self::Pending, Self::Failed) => true,
            (Self::Running, Self::Completed) => true,
            (Self::Running, Self::Failed) => true,
            (Self::Running, Self::Canceled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record of truth for a bulk validation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub tenant: String,
    pub status: JobStatus,
    /// Unique, normalized numbers enqueued for this job.
    pub total: u64,
    /// Items whose every requested platform status is non-null.
    /// Monotonically non-decreasing, never exceeds `total`.
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
    pub platforms: Vec<Platform>,
    pub country_default: Option<String>,
    pub duplicates_count: u64,
    pub invalid_count: u64,
    pub summary: Summary,
    /// Set at most once, and only when status is Completed.
    pub export_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Creates a fresh Pending job.
    pub fn new(
        tenant: impl Into<String>,
        platforms: Vec<Platform>,
        country_default: Option<String>,
        total: u64,
        duplicates_count: u64,
        invalid_count: u64,
    ) -> Self {
        Self {
            id: generate_job_id(),
            tenant: tenant.into(),
            status: JobStatus::Pending,
            total,
            processed: 0,
            success: 0,
            failed: 0,
            platforms,
            country_default,
            duplicates_count,
            invalid_count,
            summary: Summary::default(),
            export_url: None,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        }
    }

    /// Fraction complete, rounded to 2 decimals (the client-facing form).
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let raw = self.processed as f64 / self.total as f64;
        (raw * 100.0).round() / 100.0
    }
}

/// Generates an opaque, sortable-ish job id: `job_YYYYMMDD_<random>`.
pub fn generate_job_id() -> String {
    let date = Utc::now().format("%Y%m%d");
    let rand = Uuid::new_v4().simple().to_string();
    format!("job_{}_{}", date, &rand[..8])
}

/// One normalized number inside a job, mutated independently per platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobItem {
    pub job_id: String,
    pub e164: String,
    pub wa_status: Option<WaStatus>,
    pub tg_status: Option<TgStatus>,
    pub wa_checked_at: Option<DateTime<Utc>>,
    pub tg_checked_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl JobItem {
    pub fn new(job_id: impl Into<String>, e164: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            e164: e164.into(),
            wa_status: None,
            tg_status: None,
            wa_checked_at: None,
            tg_checked_at: None,
            error: None,
        }
    }

    /// An item counts as processed once every requested platform has a
    /// non-null status.
    pub fn is_processed(&self, platforms: &[Platform]) -> bool {
        platforms.iter().all(|p| match p {
            Platform::Whatsapp => self.wa_status.is_some(),
            Platform::Telegram => self.tg_status.is_some(),
        })
    }

    /// Processed with every requested status conclusive (non-unknown).
    pub fn is_success(&self, platforms: &[Platform]) -> bool {
        self.is_processed(platforms)
            && platforms.iter().all(|p| match p {
                Platform::Whatsapp => self.wa_status != Some(WaStatus::Unknown),
                Platform::Telegram => self.tg_status != Some(TgStatus::Unknown),
            })
    }

    /// Whether the given platform already has a terminal status, i.e. a
    /// redelivered message for it must be a no-op.
    pub fn has_status(&self, platform: Platform) -> bool {
        match platform {
            Platform::Whatsapp => self.wa_status.is_some(),
            Platform::Telegram => self.tg_status.is_some(),
        }
    }
}

/// Client-facing progress snapshot, polled or streamed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub processed: u64,
    pub total: u64,
    pub progress: f64,
    pub summary: Summary,
    pub duplicates_count: u64,
    pub invalid_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            processed: job.processed,
            total: job.total,
            progress: job.progress(),
            summary: job.summary.clone(),
            duplicates_count: job.duplicates_count,
            invalid_count: job.invalid_count,
            export_url: job.export_url.clone(),
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}
