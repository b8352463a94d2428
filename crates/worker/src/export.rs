//! CSV export to object storage with HMAC-signed download links.

use std::time::Instant;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use numwatch_core::limits::EXPORT_URL_EXPIRY_SECS;
use numwatch_core::{signing, Error, ExportSink, JobItem, JobStore, Result};
use telemetry::metrics;
use tracing::info;

use crate::config::ExportConfig;

pub const CSV_HEADER: [&str; 6] = [
    "e164",
    "wa_status",
    "tg_status",
    "wa_checked_at",
    "tg_checked_at",
    "error",
];

/// Renders the item set (already ordered by e164) into the export CSV.
pub fn render_csv(items: &[JobItem]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(CSV_HEADER)
        .map_err(|e| Error::export(e.to_string()))?;

    for item in items {
        let record = [
            item.e164.clone(),
            item.wa_status.map(|s| s.as_str().to_string()).unwrap_or_default(),
            item.tg_status.map(|s| s.as_str().to_string()).unwrap_or_default(),
            item.wa_checked_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            item.tg_checked_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            item.error.clone().unwrap_or_default(),
        ];
        writer
            .write_record(&record)
            .map_err(|e| Error::export(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| Error::export(e.to_string()))
}

/// S3 export sink. Download links are app-signed against the public base
/// URL rather than S3-presigned, so rotating the bucket does not
/// invalidate issued links.
pub struct S3Exporter {
    client: S3Client,
    config: ExportConfig,
}

impl S3Exporter {
    pub fn new(client: S3Client, config: ExportConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ExportSink for S3Exporter {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Error::export(format!("put_object {key}: {e}")))?;

        Ok(format!("s3://{}/{}", self.config.bucket, key))
    }

    async fn signed_url(&self, key: &str, expiry_secs: u64) -> Result<String> {
        let path = format!("/{key}");
        Ok(signing::signed_url(
            &self.config.public_base_url,
            &path,
            &self.config.signing_secret,
            expiry_secs,
        ))
    }
}

/// Generates the export artifact for a job and returns its signed URL.
pub async fn export_job(
    store: &dyn JobStore,
    sink: &dyn ExportSink,
    job_id: &str,
) -> Result<String> {
    let started = Instant::now();

    let items = store.list_items(job_id).await?;
    let bytes = render_csv(&items)?;
    let key = format!("exports/{job_id}.csv");

    sink.upload(&key, bytes, "text/csv").await?;
    let url = sink.signed_url(&key, EXPORT_URL_EXPIRY_SECS).await?;

    metrics().exports_generated.inc();
    metrics()
        .export_latency_ms
        .observe(started.elapsed().as_millis() as u64);
    info!(job_id, items = items.len(), "Export generated");
    Ok(url)
}
