//! Builders for jobs, items, and pool accounts.

use chrono::Utc;
use numwatch_core::{Job, JobStatus, JobStore, Platform, TgAccount};

use crate::mocks::MemoryStore;

/// A fresh Pending job for the default tenant.
pub fn job(platforms: Vec<Platform>, total: u64) -> Job {
    Job::new("default", platforms, None, total, 0, 0)
}

/// A job already past ingestion, as the sweep normally finds it.
pub fn running_job(platforms: Vec<Platform>, total: u64) -> Job {
    let mut job = job(platforms, total);
    job.status = JobStatus::Running;
    job.started_at = Some(Utc::now());
    job
}

/// An active pool account with clean counters.
pub fn account(id: &str) -> TgAccount {
    TgAccount {
        id: id.to_string(),
        phone_label: format!("pool-{id}"),
        api_id: "12345".to_string(),
        api_hash: "a1b2c3d4".to_string(),
        session: "session-blob".to_string(),
        proxy_url: None,
        daily_limit: 1_000,
        last_used_at: None,
        error_count: 0,
        is_active: true,
    }
}

/// Seeds a job and one item per number into the store.
pub async fn seed_job(store: &MemoryStore, job: &Job, e164s: &[&str]) {
    store.insert_job(job.clone());
    let numbers: Vec<String> = e164s.iter().map(|s| s.to_string()).collect();
    store
        .create_items(&job.id, &numbers)
        .await
        .unwrap_or_else(|e| panic!("seeding items failed: {e}"));
}
