//! Generic platform worker: stream → cache → checker → item write → ack.
//!
//! At-least-once with idempotent item writes: a message is acked only
//! after its item status is durably written, and redelivery of an already
//! terminal item is a no-op. Systemic failures leave the message pending
//! and pause the loop for one second; per-number failures resolve to
//! `Unknown` so the job still converges.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use numwatch_core::limits::{CACHE_TTL_SECS, SYSTEMIC_RETRY_MS};
use numwatch_core::{
    streams, BulkItemMessage, CachedStatus, ItemPublisher, JobStore, Platform, PlatformStatus,
    ProgressKind, ProgressMessage, Result, ResultCache, TgCheckMessage, WaStage2Message, WaStatus,
};
use numwatch_stream::{Consumer, StreamEntry};
use serde_json::{json, Value};
use telemetry::metrics;
use tracing::{debug, error, info, warn};

use crate::telegram::TelegramChecker;
use crate::whatsapp::WhatsAppChecker;

/// A resolved check, ready to be written to the item.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub status: PlatformStatus,
    pub meta: Value,
    pub error: Option<String>,
}

/// What a processor did with an item.
pub enum ProcessResult {
    /// Terminal for this platform: write the status.
    Resolved(CheckOutcome),
    /// Handed to a later pipeline stage; no status write yet.
    Deferred,
}

/// One pipeline stage's per-item logic. Errors are systemic (stream or
/// store); per-number problems resolve to `Unknown` instead. `carried` is
/// metadata handed over from an earlier stage, `Null` on entry streams.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    fn platform(&self) -> Platform;

    async fn process(&self, job_id: &str, e164: &str, carried: &Value) -> Result<ProcessResult>;
}

/// WhatsApp intake: the free stage-1 probe. Conclusive results resolve
/// here; everything else is escalated onto the stage-2 stream.
pub struct WaIntakeProcessor {
    checker: Arc<WhatsAppChecker>,
    publisher: Arc<dyn ItemPublisher>,
}

impl WaIntakeProcessor {
    pub fn new(checker: Arc<WhatsAppChecker>, publisher: Arc<dyn ItemPublisher>) -> Self {
        Self { checker, publisher }
    }
}

#[async_trait]
impl ItemProcessor for WaIntakeProcessor {
    fn platform(&self) -> Platform {
        Platform::Whatsapp
    }

    async fn process(&self, job_id: &str, e164: &str, _carried: &Value) -> Result<ProcessResult> {
        let stage1 = self.checker.stage1(e164).await;
        if stage1.status != WaStatus::Unknown {
            return Ok(ProcessResult::Resolved(CheckOutcome {
                status: PlatformStatus::Wa(stage1.status),
                meta: json!({"stage1": stage1.meta}),
                error: stage1.error,
            }));
        }

        // The probe result rides along so the terminal stage-2 write can
        // record both stages.
        self.publisher
            .publish_wa_stage2(&WaStage2Message::new(job_id, e164, stage1.meta))
            .await?;
        debug!(job_id, e164, "Escalated to stage 2");
        Ok(ProcessResult::Deferred)
    }
}

/// WhatsApp stage 2: the paid provider API. Always terminal.
pub struct WaStage2Processor {
    checker: Arc<WhatsAppChecker>,
}

impl WaStage2Processor {
    pub fn new(checker: Arc<WhatsAppChecker>) -> Self {
        Self { checker }
    }
}

#[async_trait]
impl ItemProcessor for WaStage2Processor {
    fn platform(&self) -> Platform {
        Platform::Whatsapp
    }

    async fn process(&self, _job_id: &str, e164: &str, carried: &Value) -> Result<ProcessResult> {
        let result = self.checker.stage2(e164).await;
        let meta = if carried.is_null() {
            json!({"stage2": result.meta})
        } else {
            json!({"stage1": carried, "stage2": result.meta})
        };
        Ok(ProcessResult::Resolved(CheckOutcome {
            status: PlatformStatus::Wa(result.status),
            meta,
            error: result.error,
        }))
    }
}

/// Telegram: account-pool check. Always terminal (pool exhaustion is
/// `Unknown`).
pub struct TgProcessor {
    checker: Arc<TelegramChecker>,
}

impl TgProcessor {
    pub fn new(checker: Arc<TelegramChecker>) -> Self {
        Self { checker }
    }
}

#[async_trait]
impl ItemProcessor for TgProcessor {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn process(&self, _job_id: &str, e164: &str, _carried: &Value) -> Result<ProcessResult> {
        let result = self.checker.check(e164).await;
        Ok(ProcessResult::Resolved(CheckOutcome {
            status: PlatformStatus::Tg(result.status),
            meta: result.meta,
            error: result.error,
        }))
    }
}

/// How the pipeline disposed of one item message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemDisposition {
    /// Status written (freshly checked, or served from a cache layer).
    Written(PlatformStatus),
    /// Handed to a later pipeline stage.
    Deferred,
    /// Nothing to do: terminal job, already-processed item, or an item
    /// this pool was never asked about.
    Skipped,
}

/// The per-item decision flow, independent of the stream plumbing so it
/// can run against any [`JobStore`]/[`ResultCache`] pair.
#[derive(Clone)]
pub struct ItemPipeline {
    store: Arc<dyn JobStore>,
    cache: Arc<dyn ResultCache>,
    publisher: Arc<dyn ItemPublisher>,
}

impl ItemPipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        cache: Arc<dyn ResultCache>,
        publisher: Arc<dyn ItemPublisher>,
    ) -> Self {
        Self {
            store,
            cache,
            publisher,
        }
    }

    /// Runs gate checks, both cache layers, and (only then) the checker;
    /// writes the item status and emits the progress event.
    pub async fn process(
        &self,
        processor: &dyn ItemProcessor,
        job_id: &str,
        e164: &str,
    ) -> Result<ItemDisposition> {
        self.process_carried(processor, job_id, e164, &Value::Null)
            .await
    }

    /// [`process`](Self::process) with metadata handed over from an
    /// earlier pipeline stage.
    pub async fn process_carried(
        &self,
        processor: &dyn ItemProcessor,
        job_id: &str,
        e164: &str,
        carried: &Value,
    ) -> Result<ItemDisposition> {
        let platform = processor.platform();

        // Job gate: canceled (or otherwise terminal) jobs get no more
        // writes; the pending check is simply discarded.
        let Some(job) = self.store.get_job(job_id).await? else {
            warn!(job_id, "Message references unknown job");
            return Ok(ItemDisposition::Skipped);
        };
        if job.status.is_terminal() {
            debug!(job_id, status = %job.status, "Skipping item for terminal job");
            return Ok(ItemDisposition::Skipped);
        }

        // Redelivery no-op: the item already has a status for this platform.
        match self.store.get_item(job_id, e164).await? {
            Some(item) if item.has_status(platform) => return Ok(ItemDisposition::Skipped),
            Some(_) => {}
            None => {
                warn!(job_id, e164, "Message references unknown item");
                return Ok(ItemDisposition::Skipped);
            }
        }

        // Fast cache, then durable cache.
        if let Some(hit) = self.cache.get(platform, e164).await {
            if let Some(status) = hit.status_for(platform) {
                self.write_item(job_id, e164, status, None).await?;
                return Ok(ItemDisposition::Written(status));
            }
        }
        if let Some(hit) = self.store.get_cached(platform, e164).await? {
            if let Some(status) = hit.status_for(platform) {
                self.cache
                    .set(platform, e164, hit.clone(), CACHE_TTL_SECS)
                    .await;
                self.write_item(job_id, e164, status, None).await?;
                return Ok(ItemDisposition::Written(status));
            }
        }

        match processor.process(job_id, e164, carried).await? {
            ProcessResult::Resolved(outcome) => {
                self.write_item(job_id, e164, outcome.status, outcome.error.clone())
                    .await?;

                // Only conclusive results are worth caching.
                if !outcome.status.is_unknown() {
                    let cached = CachedStatus::new(outcome.status, outcome.meta);
                    self.cache
                        .set(platform, e164, cached.clone(), CACHE_TTL_SECS)
                        .await;
                    if let Err(e) = self
                        .store
                        .put_cached(platform, e164, &cached, CACHE_TTL_SECS)
                        .await
                    {
                        warn!(e164, error = %e, "Durable cache write failed");
                    }
                }

                Ok(ItemDisposition::Written(outcome.status))
            }
            ProcessResult::Deferred => Ok(ItemDisposition::Deferred),
        }
    }

    async fn write_item(
        &self,
        job_id: &str,
        e164: &str,
        status: PlatformStatus,
        error: Option<String>,
    ) -> Result<()> {
        self.store
            .update_item_status(job_id, e164, status, Utc::now(), error)
            .await?;
        metrics().items_processed.inc();
        Ok(())
    }

    /// Progress events are hints; the aggregator recomputes from item
    /// state, so a lost event is harmless.
    pub async fn publish_progress(&self, job_id: &str, e164: &str, status: PlatformStatus) {
        let kind = match status {
            PlatformStatus::Wa(_) => ProgressKind::WaUpdate,
            PlatformStatus::Tg(_) => ProgressKind::TgUpdate,
        };
        let msg = ProgressMessage::new(job_id, kind, e164, status.as_str());
        if let Err(e) = self.publisher.publish_progress(&msg).await {
            warn!(job_id, e164, error = %e, "Progress publish failed");
        }
    }
}

enum Target {
    /// Message is not for this pool (platform not requested).
    Skip,
    Item {
        job_id: String,
        e164: String,
        carried: Value,
    },
}

/// A consumer loop bound to one stream and one processor.
pub struct PlatformWorker {
    consumer: Consumer,
    pipeline: ItemPipeline,
    processor: Arc<dyn ItemProcessor>,
    shutdown: Arc<AtomicBool>,
}

impl PlatformWorker {
    pub fn new(
        consumer: Consumer,
        pipeline: ItemPipeline,
        processor: Arc<dyn ItemProcessor>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            consumer,
            pipeline,
            processor,
            shutdown,
        }
    }

    /// Main loop: fetch (or reclaim), process, repeat until shutdown.
    pub async fn run(&self) {
        info!(
            stream = self.consumer.stream(),
            group = self.consumer.group(),
            platform = %self.processor.platform(),
            "Platform worker starting"
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.tick().await {
                metrics().stream_errors.inc();
                error!(stream = self.consumer.stream(), error = %e, "Worker tick failed");
                tokio::time::sleep(Duration::from_millis(SYSTEMIC_RETRY_MS)).await;
            }
        }

        info!(stream = self.consumer.stream(), "Platform worker stopped");
    }

    async fn tick(&self) -> Result<()> {
        let mut entries = self.consumer.fetch().await?;
        if entries.is_empty() {
            entries = self.consumer.claim_stale().await?;
        }

        for entry in &entries {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            self.handle_entry(entry).await?;
        }
        Ok(())
    }

    /// Parses the stream-specific message shape into a common target.
    fn parse_target(&self, entry: &StreamEntry) -> Result<Target> {
        let fields = &entry.fields;
        match self.consumer.stream() {
            streams::BULK_ITEMS => {
                let msg = BulkItemMessage::from_fields(fields)?;
                if !msg.platforms.contains(&self.processor.platform()) {
                    return Ok(Target::Skip);
                }
                Ok(Target::Item {
                    job_id: msg.job_id,
                    e164: msg.e164,
                    carried: Value::Null,
                })
            }
            streams::WA_STAGE2 => {
                let msg = WaStage2Message::from_fields(fields)?;
                Ok(Target::Item {
                    job_id: msg.job_id,
                    e164: msg.e164,
                    carried: msg.stage1_meta,
                })
            }
            streams::TG_CHECKS => {
                let msg = TgCheckMessage::from_fields(fields)?;
                Ok(Target::Item {
                    job_id: msg.job_id,
                    e164: msg.e164,
                    carried: Value::Null,
                })
            }
            other => Err(numwatch_core::Error::stream(format!(
                "worker bound to unexpected stream: {other}"
            ))),
        }
    }

    async fn handle_entry(&self, entry: &StreamEntry) -> Result<()> {
        let (job_id, e164, carried) = match self.parse_target(entry) {
            Ok(Target::Item {
                job_id,
                e164,
                carried,
            }) => (job_id, e164, carried),
            Ok(Target::Skip) => {
                self.consumer.ack(&entry.id).await?;
                return Ok(());
            }
            Err(e) => {
                // Poison message: acking is the only way to not reprocess
                // it forever.
                warn!(id = %entry.id, error = %e, "Dropping malformed message");
                self.consumer.ack(&entry.id).await?;
                return Ok(());
            }
        };

        let disposition = self
            .pipeline
            .process_carried(self.processor.as_ref(), &job_id, &e164, &carried)
            .await?;

        // Ack strictly after the item write.
        self.consumer.ack(&entry.id).await?;

        if let ItemDisposition::Written(status) = disposition {
            self.pipeline.publish_progress(&job_id, &e164, status).await;
        }
        Ok(())
    }
}
