//! Tests for the per-item decision flow: job gates, cache layers,
//! redelivery no-ops, and the two-stage WhatsApp escalation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use integration_tests::fixtures;
use integration_tests::mocks::{DeferProcessor, StaticProcessor};
use integration_tests::setup::{spawn_http, wa_config, TestContext};
use numwatch_core::{
    CachedStatus, ItemPublisher, JobStore, Platform, PlatformStatus, ResultCache, TgStatus,
    WaStatus,
};
use numwatch_worker::{ItemDisposition, WaIntakeProcessor, WaStage2Processor, WhatsAppChecker};
use serde_json::json;

const NUMBER: &str = "+628111111111";

#[tokio::test]
async fn test_cached_result_short_circuits_checker() {
    let ctx = TestContext::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&ctx.store, &job, &[NUMBER]).await;

    ctx.cache
        .set(
            Platform::Whatsapp,
            NUMBER,
            CachedStatus::new(PlatformStatus::Wa(WaStatus::Registered), json!({})),
            3_600,
        )
        .await;

    let processor = StaticProcessor::new(PlatformStatus::Wa(WaStatus::NotRegistered));
    let disposition = ctx
        .pipeline()
        .process(processor.as_ref(), &job.id, NUMBER)
        .await
        .unwrap();

    assert_eq!(
        disposition,
        ItemDisposition::Written(PlatformStatus::Wa(WaStatus::Registered))
    );
    assert_eq!(processor.calls(), 0, "cache hit must not invoke the checker");

    let item = ctx.store.item(&job.id, NUMBER).unwrap();
    assert_eq!(item.wa_status, Some(WaStatus::Registered));
}

#[tokio::test]
async fn test_durable_cache_hit_backfills_fast_cache() {
    let ctx = TestContext::new();
    let job = fixtures::running_job(vec![Platform::Telegram], 1);
    fixtures::seed_job(&ctx.store, &job, &[NUMBER]).await;

    let entry = CachedStatus::new(PlatformStatus::Tg(TgStatus::Registered), json!({}));
    ctx.store
        .put_cached(Platform::Telegram, NUMBER, &entry, 3_600)
        .await
        .unwrap();

    let processor = StaticProcessor::new(PlatformStatus::Tg(TgStatus::NotRegistered));
    let disposition = ctx
        .pipeline()
        .process(processor.as_ref(), &job.id, NUMBER)
        .await
        .unwrap();

    assert_eq!(
        disposition,
        ItemDisposition::Written(PlatformStatus::Tg(TgStatus::Registered))
    );
    assert_eq!(processor.calls(), 0);
    // The durable hit is promoted into the fast cache.
    assert!(ctx.cache.entry(Platform::Telegram, NUMBER).is_some());
}

#[tokio::test]
async fn test_fresh_result_written_to_both_cache_layers() {
    let ctx = TestContext::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&ctx.store, &job, &[NUMBER]).await;

    let processor = StaticProcessor::new(PlatformStatus::Wa(WaStatus::NotRegistered));
    let disposition = ctx
        .pipeline()
        .process(processor.as_ref(), &job.id, NUMBER)
        .await
        .unwrap();

    assert_eq!(
        disposition,
        ItemDisposition::Written(PlatformStatus::Wa(WaStatus::NotRegistered))
    );
    assert_eq!(processor.calls(), 1);

    let item = ctx.store.item(&job.id, NUMBER).unwrap();
    assert_eq!(item.wa_status, Some(WaStatus::NotRegistered));
    assert!(item.wa_checked_at.is_some());

    assert!(ctx.cache.entry(Platform::Whatsapp, NUMBER).is_some());
    assert!(ctx.store.cached_entry(Platform::Whatsapp, NUMBER).is_some());
}

#[tokio::test]
async fn test_unknown_results_are_not_cached() {
    let ctx = TestContext::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&ctx.store, &job, &[NUMBER]).await;

    let processor = StaticProcessor::new(PlatformStatus::Wa(WaStatus::Unknown));
    let disposition = ctx
        .pipeline()
        .process(processor.as_ref(), &job.id, NUMBER)
        .await
        .unwrap();

    // Unknown is still a written, terminal item status...
    assert_eq!(
        disposition,
        ItemDisposition::Written(PlatformStatus::Wa(WaStatus::Unknown))
    );
    // ...but never worth remembering.
    assert!(ctx.cache.entry(Platform::Whatsapp, NUMBER).is_none());
    assert!(ctx.store.cached_entry(Platform::Whatsapp, NUMBER).is_none());
}

#[tokio::test]
async fn test_redelivery_is_a_noop() {
    let ctx = TestContext::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&ctx.store, &job, &[NUMBER]).await;

    let processor = StaticProcessor::new(PlatformStatus::Wa(WaStatus::Registered));
    let pipeline = ctx.pipeline();

    let first = pipeline
        .process(processor.as_ref(), &job.id, NUMBER)
        .await
        .unwrap();
    let second = pipeline
        .process(processor.as_ref(), &job.id, NUMBER)
        .await
        .unwrap();

    assert!(matches!(first, ItemDisposition::Written(_)));
    assert_eq!(second, ItemDisposition::Skipped);
    assert_eq!(processor.calls(), 1, "redelivery must not re-run the check");
}

#[tokio::test]
async fn test_canceled_job_gets_no_writes() {
    let ctx = TestContext::new();
    let mut job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    job.status = numwatch_core::JobStatus::Canceled;
    fixtures::seed_job(&ctx.store, &job, &[NUMBER]).await;

    let processor = StaticProcessor::new(PlatformStatus::Wa(WaStatus::Registered));
    let disposition = ctx
        .pipeline()
        .process(processor.as_ref(), &job.id, NUMBER)
        .await
        .unwrap();

    assert_eq!(disposition, ItemDisposition::Skipped);
    assert_eq!(processor.calls(), 0);
    let item = ctx.store.item(&job.id, NUMBER).unwrap();
    assert!(item.wa_status.is_none());
}

#[tokio::test]
async fn test_message_for_unknown_job_is_skipped() {
    let ctx = TestContext::new();
    let processor = StaticProcessor::new(PlatformStatus::Wa(WaStatus::Registered));

    let disposition = ctx
        .pipeline()
        .process(processor.as_ref(), "job_missing", NUMBER)
        .await
        .unwrap();

    assert_eq!(disposition, ItemDisposition::Skipped);
}

#[tokio::test]
async fn test_deferred_stage_leaves_item_untouched() {
    let ctx = TestContext::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&ctx.store, &job, &[NUMBER]).await;

    let processor = DeferProcessor::new(Platform::Whatsapp);
    let disposition = ctx
        .pipeline()
        .process(processor.as_ref(), &job.id, NUMBER)
        .await
        .unwrap();

    assert_eq!(disposition, ItemDisposition::Deferred);
    let item = ctx.store.item(&job.id, NUMBER).unwrap();
    assert!(item.wa_status.is_none());
}

#[tokio::test]
async fn test_progress_event_carries_status() {
    let ctx = TestContext::new();
    ctx.pipeline()
        .publish_progress("job_1", NUMBER, PlatformStatus::Tg(TgStatus::Registered))
        .await;

    let events = ctx.publisher.progress();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].job_id, "job_1");
    assert_eq!(events[0].e164, NUMBER);
    assert_eq!(events[0].status, "registered");
}

#[tokio::test]
async fn test_inconclusive_probe_escalates_to_stage2() {
    // Plain 200 with no business signal: stage 1 cannot conclude.
    let base = spawn_http(Router::new().fallback(|| async { StatusCode::OK })).await;

    let ctx = TestContext::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&ctx.store, &job, &[NUMBER]).await;

    let checker = Arc::new(WhatsAppChecker::new(wa_config(&base)));
    let processor = WaIntakeProcessor::new(
        checker,
        ctx.publisher.clone() as Arc<dyn ItemPublisher>,
    );

    let disposition = ctx
        .pipeline()
        .process(&processor, &job.id, NUMBER)
        .await
        .unwrap();

    assert_eq!(disposition, ItemDisposition::Deferred);
    let escalated = ctx.publisher.wa_stage2();
    assert_eq!(escalated.len(), 1);
    assert_eq!(escalated[0].job_id, job.id);
    assert_eq!(escalated[0].e164, NUMBER);
    // No status yet: stage 2 owns the write.
    assert!(ctx.store.item(&job.id, NUMBER).unwrap().wa_status.is_none());
}

#[tokio::test]
async fn test_business_signal_resolves_at_stage1() {
    let base = spawn_http(Router::new().fallback(|| async {
        (StatusCode::OK, [("x-wa-business", "true")], "")
    }))
    .await;

    let ctx = TestContext::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&ctx.store, &job, &[NUMBER]).await;

    let checker = Arc::new(WhatsAppChecker::new(wa_config(&base)));
    let processor = WaIntakeProcessor::new(
        checker,
        ctx.publisher.clone() as Arc<dyn ItemPublisher>,
    );

    let disposition = ctx
        .pipeline()
        .process(&processor, &job.id, NUMBER)
        .await
        .unwrap();

    assert_eq!(
        disposition,
        ItemDisposition::Written(PlatformStatus::Wa(WaStatus::BusinessActive))
    );
    assert!(ctx.publisher.wa_stage2().is_empty());
}

#[tokio::test]
async fn test_stage2_resolves_registered() {
    let base = spawn_http(Router::new().route(
        "/v1/whatsapp/check",
        post(|| async { Json(json!({"registered": true})) }),
    ))
    .await;

    let ctx = TestContext::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&ctx.store, &job, &[NUMBER]).await;

    let checker = Arc::new(WhatsAppChecker::new(wa_config(&base)));
    let processor = WaStage2Processor::new(checker);

    let disposition = ctx
        .pipeline()
        .process(&processor, &job.id, NUMBER)
        .await
        .unwrap();

    assert_eq!(
        disposition,
        ItemDisposition::Written(PlatformStatus::Wa(WaStatus::Registered))
    );
    let item = ctx.store.item(&job.id, NUMBER).unwrap();
    assert_eq!(item.wa_status, Some(WaStatus::Registered));
}

#[tokio::test]
async fn test_stage2_client_error_is_final_unknown() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let base = spawn_http(Router::new().route(
        "/v1/whatsapp/check",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::UNPROCESSABLE_ENTITY
            }
        }),
    ))
    .await;

    let checker = WhatsAppChecker::new(wa_config(&base));
    let result = checker.stage2(NUMBER).await;

    assert_eq!(result.status, WaStatus::Unknown);
    assert!(result.error.is_some());
    assert_eq!(hits.load(Ordering::SeqCst), 1, "4xx must not be retried");
}

#[tokio::test]
async fn test_stage2_retries_server_errors() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let base = spawn_http(Router::new().route(
        "/v1/whatsapp/check",
        post(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                } else {
                    Json(json!({"registered": false})).into_response()
                }
            }
        }),
    ))
    .await;

    let checker = WhatsAppChecker::new(wa_config(&base));
    let result = checker.stage2(NUMBER).await;

    assert_eq!(result.status, WaStatus::NotRegistered);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stage2_rate_limit_honors_retry_after() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let base = spawn_http(Router::new().route(
        "/v1/whatsapp/check",
        post(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "0")], "").into_response()
                } else {
                    Json(json!({"registered": true})).into_response()
                }
            }
        }),
    ))
    .await;

    let checker = WhatsAppChecker::new(wa_config(&base));
    let started = Instant::now();
    let result = checker.stage2(NUMBER).await;

    assert_eq!(result.status, WaStatus::Registered);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    // Retry-After replaces the backoff delay for that retry; a stacked
    // backoff sleep would push this past a second.
    assert!(
        started.elapsed() < Duration::from_millis(800),
        "honoured retry-after must be the only delay, took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_escalation_records_both_stages_in_meta() {
    // Stage 1 inconclusive, stage 2 conclusive: the cached result must
    // carry both stage records, same as the synchronous quick path.
    let base = spawn_http(
        Router::new()
            .route(
                "/v1/whatsapp/check",
                post(|| async { Json(json!({"registered": true})) }),
            )
            .fallback(|| async { StatusCode::OK }),
    )
    .await;

    let ctx = TestContext::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&ctx.store, &job, &[NUMBER]).await;

    let checker = Arc::new(WhatsAppChecker::new(wa_config(&base)));
    let intake = WaIntakeProcessor::new(
        checker.clone(),
        ctx.publisher.clone() as Arc<dyn ItemPublisher>,
    );
    let disposition = ctx
        .pipeline()
        .process(&intake, &job.id, NUMBER)
        .await
        .unwrap();
    assert_eq!(disposition, ItemDisposition::Deferred);

    let escalated = ctx.publisher.wa_stage2();
    assert_eq!(escalated.len(), 1);
    assert!(
        !escalated[0].stage1_meta.is_null(),
        "escalation must carry the probe result"
    );

    let stage2 = WaStage2Processor::new(checker);
    let disposition = ctx
        .pipeline()
        .process_carried(&stage2, &job.id, NUMBER, &escalated[0].stage1_meta)
        .await
        .unwrap();
    assert_eq!(
        disposition,
        ItemDisposition::Written(PlatformStatus::Wa(WaStatus::Registered))
    );

    let cached = ctx.store.cached_entry(Platform::Whatsapp, NUMBER).unwrap();
    assert!(cached.meta.get("stage1").is_some());
    assert!(cached.meta.get("stage2").is_some());
}
