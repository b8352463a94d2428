//! Bulk job endpoints: create, poll, export.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use numwatch_core::{
    phone, BulkItemMessage, Job, JobSnapshot, JobStatus, Platform, TgCheckMessage,
};
use numwatch_worker::render_csv;
use serde::Deserialize;
use telemetry::metrics;
use tracing::info;
use validator::Validate;

use crate::response::{ApiError, BulkCreateResponse};
use crate::state::AppState;

fn default_tenant() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkRequest {
    #[validate(length(min = 1, max = 1_000_000, message = "between 1 and 1000000 numbers"))]
    pub numbers: Vec<String>,
    #[validate(length(min = 1, message = "at least one platform"))]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub country_default: Option<String>,
    #[serde(default = "default_tenant")]
    pub tenant: String,
}

pub(crate) fn validation_details(errors: &validator::ValidationErrors) -> Vec<String> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(m) => format!("{field}: {m}"),
                None => format!("{field}: {}", e.code),
            })
        })
        .collect()
}

/// Parses and dedupes the requested platform set, preserving order.
pub(crate) fn parse_platform_list(raw: &[String]) -> Result<Vec<Platform>, ApiError> {
    let mut out = Vec::new();
    for p in raw {
        let platform = Platform::parse(p)?;
        if !out.contains(&platform) {
            out.push(platform);
        }
    }
    Ok(out)
}

/// POST /v1/bulk - Creates a bulk validation job.
///
/// Normalizes and dedupes the input, creates the job and its items, and
/// fans the work out onto the streams. Returns 202: results arrive via
/// polling or the export.
pub async fn create_bulk_handler(
    State(state): State<AppState>,
    Json(req): Json<BulkRequest>,
) -> Result<(StatusCode, Json<BulkCreateResponse>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::validation(validation_details(&e)))?;
    let platforms = parse_platform_list(&req.platforms)?;

    let batch = phone::normalize_and_dedupe(&req.numbers, req.country_default.as_deref());
    metrics().numbers_invalid.inc_by(batch.invalid_count);
    metrics().numbers_deduplicated.inc_by(batch.duplicates_count);

    if batch.unique.is_empty() {
        return Err(ApiError::bad_request("no valid numbers after normalization"));
    }

    let job = Job::new(
        req.tenant,
        platforms.clone(),
        req.country_default.clone(),
        batch.unique.len() as u64,
        batch.duplicates_count,
        batch.invalid_count,
    );
    state.store.create_job(&job).await?;
    state.store.create_items(&job.id, &batch.unique).await?;

    // Jobs that never touch WhatsApp go straight onto the Telegram
    // stream; everything else fans out to both platform groups.
    let telegram_only = platforms == [Platform::Telegram];
    for e164 in &batch.unique {
        if telegram_only {
            state
                .publisher
                .publish_tg_check(&TgCheckMessage::new(&job.id, e164))
                .await?;
        } else {
            state
                .publisher
                .publish_bulk_item(&BulkItemMessage::new(&job.id, e164, platforms.clone()))
                .await?;
        }
    }

    // Eager flip; the aggregator sweep is the crash backstop.
    state
        .store
        .transition_job(&job.id, JobStatus::Pending, JobStatus::Running)
        .await?;

    info!(
        job_id = %job.id,
        total = job.total,
        duplicates = job.duplicates_count,
        invalid = job.invalid_count,
        "Bulk job created"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(BulkCreateResponse {
            job_id: job.id,
            total: job.total,
            duplicates_count: job.duplicates_count,
            invalid_count: job.invalid_count,
        }),
    ))
}

/// GET /v1/bulk/{job_id} - Progress snapshot.
pub async fn get_bulk_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    let job = state
        .store
        .get_job(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job not found: {job_id}")))?;
    Ok(Json(JobSnapshot::from(&job)))
}

/// GET /v1/bulk/{job_id}/export.csv - The result CSV, once completed.
pub async fn export_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job = state
        .store
        .get_job(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job not found: {job_id}")))?;

    if job.status != JobStatus::Completed {
        return Err(ApiError::conflict(format!(
            "export available once the job is completed (status: {})",
            job.status
        )));
    }

    let items = state.store.list_items(&job_id).await?;
    let bytes = render_csv(&items)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{job_id}.csv\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
