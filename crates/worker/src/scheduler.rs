//! Spawns and supervises the worker pools and the aggregator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use numwatch_core::{streams, ExportSink, ItemPublisher, JobStore, ResultCache};
use numwatch_stream::{Consumer, RedisClient};
use tokio::task::JoinHandle;
use tracing::info;

use crate::aggregator::Aggregator;
use crate::config::WorkerConfig;
use crate::pool::{
    ItemPipeline, ItemProcessor, PlatformWorker, TgProcessor, WaIntakeProcessor, WaStage2Processor,
};
use crate::telegram::TelegramChecker;
use crate::whatsapp::WhatsAppChecker;

pub struct WorkerScheduler {
    redis: RedisClient,
    store: Arc<dyn JobStore>,
    cache: Arc<dyn ResultCache>,
    publisher: Arc<dyn ItemPublisher>,
    wa_checker: Arc<WhatsAppChecker>,
    tg_checker: Arc<TelegramChecker>,
    sink: Arc<dyn ExportSink>,
    config: WorkerConfig,
    shutdown: Arc<AtomicBool>,
}

impl WorkerScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        redis: RedisClient,
        store: Arc<dyn JobStore>,
        cache: Arc<dyn ResultCache>,
        publisher: Arc<dyn ItemPublisher>,
        wa_checker: Arc<WhatsAppChecker>,
        tg_checker: Arc<TelegramChecker>,
        sink: Arc<dyn ExportSink>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            redis,
            store,
            cache,
            publisher,
            wa_checker,
            tg_checker,
            sink,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signals every loop to finish its current message and exit.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn spawn_pool(
        &self,
        handles: &mut Vec<JoinHandle<()>>,
        stream: &'static str,
        group: &'static str,
        name_prefix: &str,
        count: usize,
        processor: Arc<dyn ItemProcessor>,
    ) {
        let pipeline = ItemPipeline::new(
            self.store.clone(),
            self.cache.clone(),
            self.publisher.clone(),
        );
        for i in 0..count {
            let consumer = Consumer::new(
                self.redis.clone(),
                stream,
                group,
                format!("{name_prefix}-{i}"),
            );
            let worker = PlatformWorker::new(
                consumer,
                pipeline.clone(),
                processor.clone(),
                self.shutdown.clone(),
            );
            handles.push(tokio::spawn(async move { worker.run().await }));
        }
    }

    /// Starts all pools plus the aggregator's drain and sweep loops.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let wa_intake: Arc<dyn ItemProcessor> = Arc::new(WaIntakeProcessor::new(
            self.wa_checker.clone(),
            self.publisher.clone(),
        ));
        self.spawn_pool(
            &mut handles,
            streams::BULK_ITEMS,
            streams::GROUP_WA,
            "wa",
            self.config.wa_workers,
            wa_intake,
        );

        let wa_stage2: Arc<dyn ItemProcessor> =
            Arc::new(WaStage2Processor::new(self.wa_checker.clone()));
        self.spawn_pool(
            &mut handles,
            streams::WA_STAGE2,
            streams::GROUP_WA,
            "wa-stage2",
            self.config.wa_workers,
            wa_stage2,
        );

        let tg: Arc<dyn ItemProcessor> = Arc::new(TgProcessor::new(self.tg_checker.clone()));
        self.spawn_pool(
            &mut handles,
            streams::BULK_ITEMS,
            streams::GROUP_TG,
            "tg",
            self.config.tg_workers,
            tg.clone(),
        );
        self.spawn_pool(
            &mut handles,
            streams::TG_CHECKS,
            streams::GROUP_TG,
            "tg-checks",
            self.config.tg_workers,
            tg,
        );

        let aggregator = Arc::new(Aggregator::new(
            Consumer::new(
                self.redis.clone(),
                streams::BULK_PROGRESS,
                streams::GROUP_AGGREGATOR,
                "aggregator-0",
            ),
            self.store.clone(),
            self.sink.clone(),
            Duration::from_secs(self.config.sweep_interval_secs),
            self.shutdown.clone(),
        ));
        let drain = aggregator.clone();
        handles.push(tokio::spawn(async move { drain.run_drain().await }));
        handles.push(tokio::spawn(async move { aggregator.run_sweep().await }));

        info!(
            wa_workers = self.config.wa_workers,
            tg_workers = self.config.tg_workers,
            "Workers started"
        );
        handles
    }
}
