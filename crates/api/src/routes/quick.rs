//! Synchronous quick-check endpoint for small batches.

use axum::extract::State;
use axum::Json;
use numwatch_core::limits::CACHE_TTL_SECS;
use numwatch_core::{
    phone, CachedStatus, Platform, PlatformStatus, Summary, TgStatus, WaStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use telemetry::metrics;
use tokio::task::JoinSet;
use tracing::warn;
use validator::Validate;

use crate::response::ApiError;
use crate::routes::bulk::{parse_platform_list, validation_details};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct QuickRequest {
    #[validate(length(min = 1, max = 100, message = "between 1 and 100 numbers"))]
    pub numbers: Vec<String>,
    #[validate(length(min = 1, message = "at least one platform"))]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub country_default: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuickItem {
    pub e164: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wa_status: Option<WaStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tg_status: Option<TgStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuickResponse {
    pub items: Vec<QuickItem>,
    pub summary: Summary,
    pub duplicates_count: u64,
    pub invalid_count: u64,
}

async fn cache_conclusive(state: &AppState, platform: Platform, e164: &str, status: PlatformStatus, meta: Value) {
    if status.is_unknown() {
        return;
    }
    let entry = CachedStatus::new(status, meta);
    state.cache.set(platform, e164, entry.clone(), CACHE_TTL_SECS).await;
    if let Err(e) = state.store.put_cached(platform, e164, &entry, CACHE_TTL_SECS).await {
        warn!(e164, error = %e, "Durable cache write failed");
    }
}

/// Cache-first resolution for one (platform, number) pair.
async fn resolve_platform(
    state: &AppState,
    platform: Platform,
    e164: &str,
) -> (PlatformStatus, Option<String>) {
    if let Some(hit) = state.cache.get(platform, e164).await {
        if let Some(status) = hit.status_for(platform) {
            return (status, None);
        }
    }
    if let Ok(Some(hit)) = state.store.get_cached(platform, e164).await {
        if let Some(status) = hit.status_for(platform) {
            state.cache.set(platform, e164, hit, CACHE_TTL_SECS).await;
            return (status, None);
        }
    }

    match platform {
        Platform::Whatsapp => {
            let result = state.wa_checker.check(e164).await;
            let status = PlatformStatus::Wa(result.status);
            cache_conclusive(state, platform, e164, status, result.meta).await;
            (status, result.error)
        }
        Platform::Telegram => {
            let result = state.tg_checker.check(e164).await;
            let status = PlatformStatus::Tg(result.status);
            cache_conclusive(state, platform, e164, status, result.meta).await;
            (status, result.error)
        }
    }
}

async fn resolve_item(state: AppState, e164: String, platforms: Vec<Platform>) -> QuickItem {
    let mut item = QuickItem {
        e164: e164.clone(),
        wa_status: None,
        tg_status: None,
        error: None,
    };

    for platform in platforms {
        let (status, error) = resolve_platform(&state, platform, &e164).await;
        match status {
            PlatformStatus::Wa(s) => item.wa_status = Some(s),
            PlatformStatus::Tg(s) => item.tg_status = Some(s),
        }
        if item.error.is_none() {
            item.error = error;
        }
    }
    item
}

/// POST /v1/quick - Synchronous check of up to 100 numbers.
///
/// Same checkers and caches as the bulk pipeline, without a job record.
pub async fn quick_handler(
    State(state): State<AppState>,
    Json(req): Json<QuickRequest>,
) -> Result<Json<QuickResponse>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::validation(validation_details(&e)))?;
    let platforms = parse_platform_list(&req.platforms)?;

    let batch = phone::normalize_and_dedupe(&req.numbers, req.country_default.as_deref());
    metrics().numbers_invalid.inc_by(batch.invalid_count);
    metrics().numbers_deduplicated.inc_by(batch.duplicates_count);

    if batch.unique.is_empty() {
        return Err(ApiError::bad_request("no valid numbers after normalization"));
    }

    let mut tasks = JoinSet::new();
    for e164 in &batch.unique {
        tasks.spawn(resolve_item(state.clone(), e164.clone(), platforms.clone()));
    }

    let mut items: Vec<QuickItem> = Vec::with_capacity(batch.unique.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(item) => items.push(item),
            Err(e) => return Err(ApiError::internal(format!("quick check task failed: {e}"))),
        }
    }
    items.sort_by(|a, b| a.e164.cmp(&b.e164));

    let mut summary = Summary::default();
    for item in &items {
        if let Some(s) = item.wa_status {
            summary.record_wa(s);
        }
        if let Some(s) = item.tg_status {
            summary.record_tg(s);
        }
    }

    Ok(Json(QuickResponse {
        items,
        summary,
        duplicates_count: batch.duplicates_count,
        invalid_count: batch.invalid_count,
    }))
}
