//! Progress aggregation and the completion sweep.
//!
//! Progress events are treated as hints only: every refresh recomputes
//! processed/success/failed and the summary histograms from item state, so
//! duplicated or lost events cannot skew the counters. The periodic sweep
//! is the single completion authority.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use numwatch_core::limits::SYSTEMIC_RETRY_MS;
use numwatch_core::{
    compute_stats, ExportSink, Job, JobStatus, JobStore, ProgressMessage, Result,
};
use numwatch_stream::Consumer;
use telemetry::metrics;
use tracing::{debug, error, info, warn};

use crate::export::export_job;

/// Recomputes a job's aggregates from item state and persists them.
pub async fn refresh_job_progress(store: &dyn JobStore, job_id: &str) -> Result<()> {
    let Some(job) = store.get_job(job_id).await? else {
        warn!(job_id, "Progress event for unknown job");
        return Ok(());
    };
    if job.status.is_terminal() {
        return Ok(());
    }

    let items = store.list_items(job_id).await?;
    let stats = compute_stats(&items, &job.platforms);
    store
        .update_job_progress(job_id, stats.processed, stats.success, stats.failed, &stats.summary)
        .await?;
    debug!(job_id, processed = stats.processed, "Job progress refreshed");
    Ok(())
}

/// One sweep pass over a single active job.
pub async fn sweep_job(store: &dyn JobStore, sink: &dyn ExportSink, job: &Job) -> Result<()> {
    match job.status {
        JobStatus::Pending => {
            // Backstop: ingestion flips Running right after publishing;
            // this catches a crash between create and flip.
            let processed = store.count_processed(&job.id, &job.platforms).await?;
            if processed > 0 {
                store
                    .transition_job(&job.id, JobStatus::Pending, JobStatus::Running)
                    .await?;
            }
            Ok(())
        }
        JobStatus::Running => {
            let items = store.list_items(&job.id).await?;
            let stats = compute_stats(&items, &job.platforms);
            store
                .update_job_progress(
                    &job.id,
                    stats.processed,
                    stats.success,
                    stats.failed,
                    &stats.summary,
                )
                .await?;

            if stats.processed >= job.total {
                complete_job(store, sink, job).await?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Completion: generate the export first, then take the guarded
/// transition. A concurrent sweep that loses the compare-and-set has
/// only re-rendered an identical artifact.
async fn complete_job(store: &dyn JobStore, sink: &dyn ExportSink, job: &Job) -> Result<()> {
    match export_job(store, sink, &job.id).await {
        Ok(url) => {
            let won = store.complete_with_export(&job.id, &url).await?;
            if won {
                metrics().jobs_completed.inc();
                info!(job_id = %job.id, total = job.total, "Job completed");
            }
            Ok(())
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "Export failed, failing job");
            let failed = store
                .transition_job(&job.id, JobStatus::Running, JobStatus::Failed)
                .await?;
            if failed {
                metrics().jobs_failed.inc();
            }
            Ok(())
        }
    }
}

/// Sweeps every active job once. Per-job failures are logged and do not
/// stop the pass.
pub async fn sweep_active_jobs(store: &dyn JobStore, sink: &dyn ExportSink) -> Result<()> {
    let jobs = store.list_active_jobs().await?;
    metrics().active_jobs.set(jobs.len() as u64);

    for job in jobs {
        if let Err(e) = sweep_job(store, sink, &job).await {
            error!(job_id = %job.id, error = %e, "Sweep of job failed");
        }
    }
    Ok(())
}

/// Owns the progress drain loop and the periodic completion sweep.
pub struct Aggregator {
    consumer: Consumer,
    store: Arc<dyn JobStore>,
    sink: Arc<dyn ExportSink>,
    sweep_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Aggregator {
    pub fn new(
        consumer: Consumer,
        store: Arc<dyn JobStore>,
        sink: Arc<dyn ExportSink>,
        sweep_interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            consumer,
            store,
            sink,
            sweep_interval,
            shutdown,
        }
    }

    /// Drains progress events and refreshes the affected jobs.
    pub async fn run_drain(&self) {
        info!("Aggregator drain loop starting");
        while !self.shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.drain_tick().await {
                metrics().stream_errors.inc();
                error!(error = %e, "Aggregator drain failed");
                tokio::time::sleep(Duration::from_millis(SYSTEMIC_RETRY_MS)).await;
            }
        }
        info!("Aggregator drain loop stopped");
    }

    async fn drain_tick(&self) -> Result<()> {
        let mut entries = self.consumer.fetch().await?;
        if entries.is_empty() {
            entries = self.consumer.claim_stale().await?;
        }
        if entries.is_empty() {
            return Ok(());
        }

        // One refresh per distinct job, not per event.
        let mut job_ids: Vec<String> = Vec::new();
        for entry in &entries {
            match ProgressMessage::from_fields(&entry.fields) {
                Ok(msg) => {
                    if !job_ids.contains(&msg.job_id) {
                        job_ids.push(msg.job_id);
                    }
                }
                Err(e) => warn!(id = %entry.id, error = %e, "Dropping malformed progress event"),
            }
        }

        for job_id in &job_ids {
            refresh_job_progress(self.store.as_ref(), job_id).await?;
        }
        for entry in &entries {
            self.consumer.ack(&entry.id).await?;
        }
        Ok(())
    }

    /// Periodic reconciliation over active jobs. Catches lost progress
    /// events and owns the Running → Completed flip.
    pub async fn run_sweep(&self) {
        info!(interval_secs = self.sweep_interval.as_secs(), "Completion sweep starting");
        let mut ticker = tokio::time::interval(self.sweep_interval);

        while !self.shutdown.load(Ordering::Relaxed) {
            ticker.tick().await;
            if let Err(e) = sweep_active_jobs(self.store.as_ref(), self.sink.as_ref()).await {
                error!(error = %e, "Sweep failed");
            }
        }
        info!("Completion sweep stopped");
    }
}
