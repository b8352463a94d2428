//! End-to-end API tests over the real router with in-memory collaborators.

use axum::http::StatusCode;
use integration_tests::fixtures;
use integration_tests::mocks::SessionReply;
use integration_tests::setup::TestContext;
use numwatch_core::{
    CachedStatus, JobStatus, JobStore, Platform, PlatformStatus, ResultCache, WaStatus,
};
use serde_json::{json, Value};

#[tokio::test]
async fn test_bulk_create_normalizes_and_dedupes() {
    let ctx = TestContext::new();
    let server = ctx.server();

    // Three spellings of the same Indonesian number.
    let response = server
        .post("/v1/bulk")
        .json(&json!({
            "numbers": ["+628123456789", "0812-3456-789", "+62 812 3456 789"],
            "platforms": ["whatsapp", "telegram"],
            "country_default": "ID",
        }))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["duplicates_count"], 2);
    assert_eq!(body["invalid_count"], 0);

    let job_id = body["job_id"].as_str().unwrap();
    assert!(job_id.starts_with("job_"));

    // Ingestion flips to Running eagerly and fans one message per number.
    let job = ctx.store.job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.total, 1);

    let published = ctx.publisher.bulk_items();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].e164, "+628123456789");
    assert_eq!(
        published[0].platforms,
        vec![Platform::Whatsapp, Platform::Telegram]
    );
    assert!(ctx.store.item(job_id, "+628123456789").is_some());
}

#[tokio::test]
async fn test_telegram_only_job_routes_to_telegram_stream() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .post("/v1/bulk")
        .json(&json!({
            "numbers": ["+628111111111", "+628222222222"],
            "platforms": ["telegram"],
        }))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    assert_eq!(ctx.publisher.tg_checks().len(), 2);
    assert!(ctx.publisher.bulk_items().is_empty());
}

#[tokio::test]
async fn test_empty_number_list_is_rejected() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .post("/v1/bulk")
        .json(&json!({"numbers": [], "platforms": ["whatsapp"]}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_001");
    assert!(body["details"].is_array());
}

#[tokio::test]
async fn test_unknown_platform_is_rejected() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .post("/v1/bulk")
        .json(&json!({"numbers": ["+628111111111"], "platforms": ["viber"]}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_001");
}

#[tokio::test]
async fn test_all_invalid_numbers_are_rejected() {
    let ctx = TestContext::new();
    let server = ctx.server();

    // National format without a default country cannot be resolved.
    let response = server
        .post("/v1/bulk")
        .json(&json!({"numbers": ["not-a-number", "0812345"], "platforms": ["whatsapp"]}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(ctx.publisher.bulk_items().is_empty());
}

#[tokio::test]
async fn test_snapshot_reports_progress() {
    let ctx = TestContext::new();
    let mut job = fixtures::running_job(vec![Platform::Whatsapp], 2);
    job.processed = 1;
    ctx.store.insert_job(job.clone());
    let server = ctx.server();

    let response = server.get(&format!("/v1/bulk/{}", job.id)).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["processed"], 1);
    assert_eq!(body["total"], 2);
    assert_eq!(body["progress"], 0.5);
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server.get("/v1/bulk/job_20260101_missing").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["code"], "JOB_001");
}

#[tokio::test]
async fn test_export_is_conflict_until_completed() {
    let ctx = TestContext::new();
    let job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    fixtures::seed_job(&ctx.store, &job, &["+628111111111"]).await;
    let server = ctx.server();

    let response = server
        .get(&format!("/v1/bulk/{}/export.csv", job.id))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "JOB_002");
}

#[tokio::test]
async fn test_export_streams_csv_for_completed_job() {
    let ctx = TestContext::new();
    let mut job = fixtures::running_job(vec![Platform::Whatsapp], 1);
    job.status = JobStatus::Completed;
    fixtures::seed_job(&ctx.store, &job, &["+628111111111"]).await;
    ctx.store
        .update_item_status(
            &job.id,
            "+628111111111",
            PlatformStatus::Wa(WaStatus::Registered),
            chrono::Utc::now(),
            None,
        )
        .await
        .unwrap();
    let server = ctx.server();

    let response = server
        .get(&format!("/v1/bulk/{}/export.csv", job.id))
        .await;

    response.assert_status_ok();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/csv"));

    let text = response.text();
    let lines: Vec<&str> = text.trim_end().lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("e164,wa_status"));
    assert!(lines[1].starts_with("+628111111111,registered"));
}

#[tokio::test]
async fn test_quick_check_resolves_telegram_and_caches() {
    let ctx = TestContext::new();
    ctx.session.set_default(SessionReply::Registered);
    let server = ctx.server();

    let response = server
        .post("/v1/quick")
        .json(&json!({
            "numbers": ["+628222222222", "+628111111111"],
            "platforms": ["telegram"],
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    // Ordered by e164 regardless of input order.
    assert_eq!(items[0]["e164"], "+628111111111");
    assert_eq!(items[0]["tg_status"], "registered");
    assert_eq!(body["summary"]["tg"]["registered"], 2);

    // Conclusive results land in the durable cache for later bulk jobs.
    assert!(ctx
        .store
        .cached_entry(Platform::Telegram, "+628111111111")
        .is_some());
}

#[tokio::test]
async fn test_quick_check_serves_whatsapp_from_cache() {
    let ctx = TestContext::new();
    // A cached result means the checker (and its network) is never touched.
    ctx.cache
        .set(
            Platform::Whatsapp,
            "+628111111111",
            CachedStatus::new(PlatformStatus::Wa(WaStatus::BusinessActive), json!({})),
            3_600,
        )
        .await;
    let server = ctx.server();

    let response = server
        .post("/v1/quick")
        .json(&json!({
            "numbers": ["+628111111111"],
            "platforms": ["whatsapp"],
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["items"][0]["wa_status"], "business_active");
    assert_eq!(body["summary"]["wa"]["business_active"], 1);
}

#[tokio::test]
async fn test_quick_check_enforces_batch_limit() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let numbers: Vec<String> = (0..101).map(|i| format!("+6281234{i:05}")).collect();
    let response = server
        .post("/v1/quick")
        .json(&json!({"numbers": numbers, "platforms": ["telegram"]}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_001");
}

#[tokio::test]
async fn test_liveness_probe() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server.get("/health/live").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_health_reports_components() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["redis_connected"].is_boolean());
    assert!(body["postgres_connected"].is_boolean());
}
