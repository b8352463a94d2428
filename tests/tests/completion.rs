//! Tests for the aggregator: progress recomputation, the completion
//! sweep, and export generation.

use std::sync::Arc;

use chrono::Utc;
use integration_tests::fixtures;
use integration_tests::mocks::{MemorySink, MemoryStore};
use numwatch_core::{JobStatus, JobStore, Platform, PlatformStatus, Summary, WaStatus};
use numwatch_worker::{refresh_job_progress, sweep_active_jobs, sweep_job};

async fn mark_checked(store: &MemoryStore, job_id: &str, e164: &str, status: WaStatus) {
    store
        .update_item_status(job_id, e164, PlatformStatus::Wa(status), Utc::now(), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_job_completes_once_all_items_are_processed() {
    let store = Arc::new(MemoryStore::new());
    let sink = MemorySink::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 3);
    fixtures::seed_job(&store, &job, &["+628111", "+628222", "+628333"]).await;

    mark_checked(&store, &job.id, "+628111", WaStatus::Registered).await;
    mark_checked(&store, &job.id, "+628222", WaStatus::NotRegistered).await;

    sweep_active_jobs(store.as_ref(), &sink).await.unwrap();

    let current = store.job(&job.id).unwrap();
    assert_eq!(current.status, JobStatus::Running);
    assert_eq!(current.processed, 2);
    assert_eq!(current.progress(), 0.67);
    assert_eq!(current.summary.wa.registered, 1);
    assert!(current.export_url.is_none());
    assert_eq!(sink.upload_count(), 0);

    mark_checked(&store, &job.id, "+628333", WaStatus::BusinessActive).await;
    sweep_active_jobs(store.as_ref(), &sink).await.unwrap();

    let current = store.job(&job.id).unwrap();
    assert_eq!(current.status, JobStatus::Completed);
    assert_eq!(current.processed, 3);
    assert!(current.finished_at.is_some());
    let url = current.export_url.expect("completed job must carry its export URL");
    assert!(url.contains(&format!("exports/{}.csv", job.id)));

    // The artifact: header plus one row per item, ordered by e164.
    let bytes = sink
        .bytes_for(&format!("exports/{}.csv", job.id))
        .expect("export must be uploaded");
    let text = String::from_utf8(bytes).unwrap();
    let lines: Vec<&str> = text.trim_end().lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("e164,wa_status,tg_status"));
    assert!(lines[1].starts_with("+628111,registered"));
    assert!(lines[3].starts_with("+628333,business_active"));
}

#[tokio::test]
async fn test_completed_job_leaves_the_sweep_set() {
    let store = Arc::new(MemoryStore::new());
    let sink = MemorySink::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&store, &job, &["+628111"]).await;
    mark_checked(&store, &job.id, "+628111", WaStatus::Registered).await;

    sweep_active_jobs(store.as_ref(), &sink).await.unwrap();
    assert_eq!(store.job(&job.id).unwrap().status, JobStatus::Completed);
    assert_eq!(sink.upload_count(), 1);

    // A later pass has nothing active left to do.
    sweep_active_jobs(store.as_ref(), &sink).await.unwrap();
    assert_eq!(sink.upload_count(), 1);
}

#[tokio::test]
async fn test_export_failure_fails_the_job() {
    let store = Arc::new(MemoryStore::new());
    let sink = MemorySink::new();
    sink.set_should_fail(true);
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&store, &job, &["+628111"]).await;
    mark_checked(&store, &job.id, "+628111", WaStatus::Registered).await;

    sweep_active_jobs(store.as_ref(), &sink).await.unwrap();

    let current = store.job(&job.id).unwrap();
    assert_eq!(current.status, JobStatus::Failed);
    assert!(current.export_url.is_none());
    assert!(current.finished_at.is_some());
}

#[tokio::test]
async fn test_pending_job_with_progress_is_promoted() {
    let store = Arc::new(MemoryStore::new());
    let sink = MemorySink::new();
    // As if the process crashed between item creation and the eager flip.
    let job = fixtures::job(vec![Platform::Whatsapp], 2);
    fixtures::seed_job(&store, &job, &["+628111", "+628222"]).await;
    mark_checked(&store, &job.id, "+628111", WaStatus::Registered).await;

    sweep_job(store.as_ref(), &sink, &job).await.unwrap();
    assert_eq!(store.job(&job.id).unwrap().status, JobStatus::Running);
}

#[tokio::test]
async fn test_pending_job_without_progress_is_left_alone() {
    let store = Arc::new(MemoryStore::new());
    let sink = MemorySink::new();
    let job = fixtures::job(vec![Platform::Whatsapp], 2);
    fixtures::seed_job(&store, &job, &["+628111", "+628222"]).await;

    sweep_job(store.as_ref(), &sink, &job).await.unwrap();
    assert_eq!(store.job(&job.id).unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn test_refresh_recomputes_from_item_state() {
    let store = Arc::new(MemoryStore::new());
    let job = fixtures::running_job(vec![Platform::Whatsapp], 2);
    fixtures::seed_job(&store, &job, &["+628111", "+628222"]).await;
    mark_checked(&store, &job.id, "+628111", WaStatus::Unknown).await;

    // Repeated refreshes converge on the same counts; redelivered events
    // cannot inflate them.
    refresh_job_progress(store.as_ref(), &job.id).await.unwrap();
    refresh_job_progress(store.as_ref(), &job.id).await.unwrap();

    let current = store.job(&job.id).unwrap();
    assert_eq!(current.processed, 1);
    assert_eq!(current.success, 0);
    assert_eq!(current.summary.wa.unknown, 1);
}

#[tokio::test]
async fn test_refresh_skips_terminal_jobs() {
    let store = Arc::new(MemoryStore::new());
    let mut job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    job.status = JobStatus::Canceled;
    fixtures::seed_job(&store, &job, &["+628111"]).await;
    mark_checked(&store, &job.id, "+628111", WaStatus::Registered).await;

    refresh_job_progress(store.as_ref(), &job.id).await.unwrap();

    // Counts stay frozen where cancellation left them.
    assert_eq!(store.job(&job.id).unwrap().processed, 0);
}

#[tokio::test]
async fn test_unknown_statuses_complete_but_do_not_count_as_success() {
    let store = Arc::new(MemoryStore::new());
    let sink = MemorySink::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 2);
    fixtures::seed_job(&store, &job, &["+628111", "+628222"]).await;
    mark_checked(&store, &job.id, "+628111", WaStatus::Registered).await;
    mark_checked(&store, &job.id, "+628222", WaStatus::Unknown).await;

    sweep_active_jobs(store.as_ref(), &sink).await.unwrap();

    let current = store.job(&job.id).unwrap();
    assert_eq!(current.status, JobStatus::Completed);
    assert_eq!(current.processed, 2);
    assert_eq!(current.success, 1);
}

#[tokio::test]
async fn test_stale_progress_write_is_dropped() {
    let store = Arc::new(MemoryStore::new());
    let job = fixtures::running_job(vec![Platform::Whatsapp], 3);
    fixtures::seed_job(&store, &job, &["+628111", "+628222", "+628333"]).await;
    mark_checked(&store, &job.id, "+628111", WaStatus::Registered).await;
    mark_checked(&store, &job.id, "+628222", WaStatus::Registered).await;
    refresh_job_progress(store.as_ref(), &job.id).await.unwrap();
    assert_eq!(store.job(&job.id).unwrap().processed, 2);

    // A writer that recomputed its counts from an older item snapshot
    // loses the race whole: processed never decreases.
    let mut stale = Summary::default();
    stale.wa.registered = 1;
    store
        .update_job_progress(&job.id, 1, 1, 0, &stale)
        .await
        .unwrap();

    let current = store.job(&job.id).unwrap();
    assert_eq!(current.processed, 2);
    assert_eq!(current.success, 2);
    assert_eq!(current.summary.wa.registered, 2);
}

#[tokio::test]
async fn test_completion_stamps_status_and_url_together() {
    let store = Arc::new(MemoryStore::new());
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&store, &job, &["+628111"]).await;

    let won = store
        .complete_with_export(&job.id, "mem://exports/a.csv")
        .await
        .unwrap();
    assert!(won);
    let current = store.job(&job.id).unwrap();
    assert_eq!(current.status, JobStatus::Completed);
    assert_eq!(current.export_url.as_deref(), Some("mem://exports/a.csv"));
    assert!(current.finished_at.is_some());

    // A sweep losing the race gets false and must not clobber the URL.
    let won = store
        .complete_with_export(&job.id, "mem://exports/other.csv")
        .await
        .unwrap();
    assert!(!won);
    assert_eq!(
        store.job(&job.id).unwrap().export_url.as_deref(),
        Some("mem://exports/a.csv")
    );
}
