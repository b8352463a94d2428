//! The [`JobStore`] implementation over Postgres.
//!
//! Every correctness-critical write lives here: guarded status
//! transitions, idempotent per-platform item upserts, and atomic account
//! error counters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use numwatch_core::limits::TG_ACCOUNT_ERROR_THRESHOLD;
use numwatch_core::{
    parse_platforms, CachedStatus, Error, Job, JobItem, JobStatus, JobStore, Platform,
    PlatformStatus, Result, Summary, TgAccount, TgStatus, WaStatus,
};
use sqlx::postgres::PgRow;
use sqlx::Row;
use telemetry::metrics;
use tracing::{debug, warn};

use crate::client::PgClient;

const JOB_COLUMNS: &str = "id, tenant, status, total, processed, success, failed, platforms, \
    country_default, duplicates_count, invalid_count, summary, export_url, \
    started_at, finished_at, created_at";

const ITEM_COLUMNS: &str =
    "job_id, e164, wa_status, tg_status, wa_checked_at, tg_checked_at, error";

const ACCOUNT_COLUMNS: &str = "id, phone_label, api_id, api_hash, session, proxy_url, \
    daily_limit, last_used_at, error_count, is_active";

fn db_err(context: &str, e: sqlx::Error) -> Error {
    metrics().store_errors.inc();
    Error::store(format!("{context}: {e}"))
}

fn job_from_row(row: &PgRow) -> Result<Job> {
    let status_raw: String = row.try_get("status").map_err(|e| db_err("jobs row", e))?;
    let platforms_raw: String = row
        .try_get("platforms")
        .map_err(|e| db_err("jobs row", e))?;
    let summary_raw: String = row.try_get("summary").map_err(|e| db_err("jobs row", e))?;
    let summary: Summary = serde_json::from_str(&summary_raw).unwrap_or_default();

    Ok(Job {
        id: row.try_get("id").map_err(|e| db_err("jobs row", e))?,
        tenant: row.try_get("tenant").map_err(|e| db_err("jobs row", e))?,
        status: JobStatus::parse(&status_raw)?,
        total: row.try_get::<i64, _>("total").map_err(|e| db_err("jobs row", e))? as u64,
        processed: row
            .try_get::<i64, _>("processed")
            .map_err(|e| db_err("jobs row", e))? as u64,
        success: row
            .try_get::<i64, _>("success")
            .map_err(|e| db_err("jobs row", e))? as u64,
        failed: row
            .try_get::<i64, _>("failed")
            .map_err(|e| db_err("jobs row", e))? as u64,
        platforms: parse_platforms(&platforms_raw)?,
        country_default: row
            .try_get("country_default")
            .map_err(|e| db_err("jobs row", e))?,
        duplicates_count: row
            .try_get::<i64, _>("duplicates_count")
            .map_err(|e| db_err("jobs row", e))? as u64,
        invalid_count: row
            .try_get::<i64, _>("invalid_count")
            .map_err(|e| db_err("jobs row", e))? as u64,
        summary,
        export_url: row
            .try_get("export_url")
            .map_err(|e| db_err("jobs row", e))?,
        started_at: row
            .try_get("started_at")
            .map_err(|e| db_err("jobs row", e))?,
        finished_at: row
            .try_get("finished_at")
            .map_err(|e| db_err("jobs row", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| db_err("jobs row", e))?,
    })
}

fn item_from_row(row: &PgRow) -> Result<JobItem> {
    let wa_raw: Option<String> = row
        .try_get("wa_status")
        .map_err(|e| db_err("job_items row", e))?;
    let tg_raw: Option<String> = row
        .try_get("tg_status")
        .map_err(|e| db_err("job_items row", e))?;

    Ok(JobItem {
        job_id: row
            .try_get("job_id")
            .map_err(|e| db_err("job_items row", e))?,
        e164: row
            .try_get("e164")
            .map_err(|e| db_err("job_items row", e))?,
        wa_status: wa_raw.as_deref().and_then(WaStatus::parse),
        tg_status: tg_raw.as_deref().and_then(TgStatus::parse),
        wa_checked_at: row
            .try_get("wa_checked_at")
            .map_err(|e| db_err("job_items row", e))?,
        tg_checked_at: row
            .try_get("tg_checked_at")
            .map_err(|e| db_err("job_items row", e))?,
        error: row
            .try_get("error")
            .map_err(|e| db_err("job_items row", e))?,
    })
}

fn account_from_row(row: &PgRow) -> Result<TgAccount> {
    Ok(TgAccount {
        id: row
            .try_get("id")
            .map_err(|e| db_err("tg_accounts row", e))?,
        phone_label: row
            .try_get("phone_label")
            .map_err(|e| db_err("tg_accounts row", e))?,
        api_id: row
            .try_get("api_id")
            .map_err(|e| db_err("tg_accounts row", e))?,
        api_hash: row
            .try_get("api_hash")
            .map_err(|e| db_err("tg_accounts row", e))?,
        session: row
            .try_get("session")
            .map_err(|e| db_err("tg_accounts row", e))?,
        proxy_url: row
            .try_get("proxy_url")
            .map_err(|e| db_err("tg_accounts row", e))?,
        daily_limit: row
            .try_get::<i32, _>("daily_limit")
            .map_err(|e| db_err("tg_accounts row", e))? as u32,
        last_used_at: row
            .try_get("last_used_at")
            .map_err(|e| db_err("tg_accounts row", e))?,
        error_count: row
            .try_get::<i32, _>("error_count")
            .map_err(|e| db_err("tg_accounts row", e))?
            .max(0) as u32,
        is_active: row
            .try_get("is_active")
            .map_err(|e| db_err("tg_accounts row", e))?,
    })
}

/// Processed-count predicate for the requested platform set. Column names
/// only, never user input.
fn processed_condition(platforms: &[Platform]) -> String {
    let mut parts = Vec::new();
    for platform in platforms {
        match platform {
            Platform::Whatsapp => parts.push("wa_status IS NOT NULL"),
            Platform::Telegram => parts.push("tg_status IS NOT NULL"),
        }
    }
    if parts.is_empty() {
        "TRUE".to_string()
    } else {
        parts.join(" AND ")
    }
}

/// Postgres-backed [`JobStore`].
#[derive(Clone)]
pub struct PgStore {
    client: PgClient,
}

impl PgStore {
    pub fn new(client: PgClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, job: &Job) -> Result<()> {
        let platforms = numwatch_core::platforms_to_string(&job.platforms);
        let summary = serde_json::to_string(&job.summary)?;

        sqlx::query(
            "INSERT INTO jobs
                (id, tenant, status, total, processed, success, failed, platforms,
                 country_default, duplicates_count, invalid_count, summary, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(&job.id)
        .bind(&job.tenant)
        .bind(job.status.as_str())
        .bind(job.total as i64)
        .bind(job.processed as i64)
        .bind(job.success as i64)
        .bind(job.failed as i64)
        .bind(&platforms)
        .bind(&job.country_default)
        .bind(job.duplicates_count as i64)
        .bind(job.invalid_count as i64)
        .bind(&summary)
        .bind(job.created_at)
        .execute(self.client.pool())
        .await
        .map_err(|e| db_err("create_job", e))?;

        metrics().jobs_created.inc();
        Ok(())
    }

    async fn create_items(&self, job_id: &str, e164s: &[String]) -> Result<()> {
        if e164s.is_empty() {
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO job_items (job_id, e164)
             SELECT $1, e164 FROM UNNEST($2::text[]) AS t(e164)
             ON CONFLICT (job_id, e164) DO NOTHING",
        )
        .bind(job_id)
        .bind(e164s)
        .execute(self.client.pool())
        .await
        .map_err(|e| db_err("create_items", e))?;

        debug!(job_id, count = e164s.len(), "Created job items");
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(self.client.pool())
            .await
            .map_err(|e| db_err("get_job", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn get_item(&self, job_id: &str, e164: &str) -> Result<Option<JobItem>> {
        let query = format!("SELECT {ITEM_COLUMNS} FROM job_items WHERE job_id = $1 AND e164 = $2");
        let row = sqlx::query(&query)
            .bind(job_id)
            .bind(e164)
            .fetch_optional(self.client.pool())
            .await
            .map_err(|e| db_err("get_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn update_item_status(
        &self,
        job_id: &str,
        e164: &str,
        status: PlatformStatus,
        checked_at: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<()> {
        let query = match status {
            PlatformStatus::Wa(_) => {
                "UPDATE job_items
                 SET wa_status = $3, wa_checked_at = $4, error = COALESCE($5, error)
                 WHERE job_id = $1 AND e164 = $2"
            }
            PlatformStatus::Tg(_) => {
                "UPDATE job_items
                 SET tg_status = $3, tg_checked_at = $4, error = COALESCE($5, error)
                 WHERE job_id = $1 AND e164 = $2"
            }
        };

        let result = sqlx::query(query)
            .bind(job_id)
            .bind(e164)
            .bind(status.as_str())
            .bind(checked_at)
            .bind(&error)
            .execute(self.client.pool())
            .await
            .map_err(|e| db_err("update_item_status", e))?;

        if result.rows_affected() == 0 {
            warn!(job_id, e164, "Status write matched no item");
        }
        Ok(())
    }

    async fn count_processed(&self, job_id: &str, platforms: &[Platform]) -> Result<u64> {
        let query = format!(
            "SELECT COUNT(*) AS n FROM job_items WHERE job_id = $1 AND {}",
            processed_condition(platforms)
        );
        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_one(self.client.pool())
            .await
            .map_err(|e| db_err("count_processed", e))?;

        let n: i64 = row.try_get("n").map_err(|e| db_err("count_processed", e))?;
        Ok(n.max(0) as u64)
    }

    async fn list_items(&self, job_id: &str) -> Result<Vec<JobItem>> {
        let query =
            format!("SELECT {ITEM_COLUMNS} FROM job_items WHERE job_id = $1 ORDER BY e164");
        let rows = sqlx::query(&query)
            .bind(job_id)
            .fetch_all(self.client.pool())
            .await
            .map_err(|e| db_err("list_items", e))?;

        rows.iter().map(item_from_row).collect()
    }

    async fn update_job_progress(
        &self,
        job_id: &str,
        processed: u64,
        success: u64,
        failed: u64,
        summary: &Summary,
    ) -> Result<()> {
        let summary = serde_json::to_string(summary)?;
        // The drain loop and the sweep both recompute-then-write; a writer
        // holding a stale item snapshot is dropped whole so `processed`
        // never regresses and the counters stay consistent with the summary.
        sqlx::query(
            "UPDATE jobs SET processed = $2, success = $3, failed = $4, summary = $5
             WHERE id = $1 AND processed <= $2",
        )
        .bind(job_id)
        .bind(processed as i64)
        .bind(success as i64)
        .bind(failed as i64)
        .bind(&summary)
        .execute(self.client.pool())
        .await
        .map_err(|e| db_err("update_job_progress", e))?;
        Ok(())
    }

    async fn transition_job(&self, job_id: &str, from: JobStatus, to: JobStatus) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        // Compare-and-set on the current status; losing a race returns false.
        let result = sqlx::query(
            "UPDATE jobs
             SET status = $3,
                 started_at = CASE WHEN $3 = 'running' THEN now() ELSE started_at END,
                 finished_at = CASE WHEN $3 IN ('completed', 'failed', 'canceled')
                               THEN now() ELSE finished_at END
             WHERE id = $1 AND status = $2",
        )
        .bind(job_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(self.client.pool())
        .await
        .map_err(|e| db_err("transition_job", e))?;

        let applied = result.rows_affected() == 1;
        if applied {
            debug!(job_id, from = %from, to = %to, "Job transitioned");
        }
        Ok(applied)
    }

    async fn complete_with_export(&self, job_id: &str, export_url: &str) -> Result<bool> {
        // Status, finished_at, and the export URL land in one statement, so
        // a crash cannot strand a Completed job without its URL.
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'completed', finished_at = now(), export_url = $2
             WHERE id = $1 AND status = 'running'",
        )
        .bind(job_id)
        .bind(export_url)
        .execute(self.client.pool())
        .await
        .map_err(|e| db_err("complete_with_export", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_active_jobs(&self) -> Result<Vec<Job>> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE status IN ('pending', 'running')
             ORDER BY created_at"
        );
        let rows = sqlx::query(&query)
            .fetch_all(self.client.pool())
            .await
            .map_err(|e| db_err("list_active_jobs", e))?;

        rows.iter().map(job_from_row).collect()
    }

    async fn load_active_accounts(&self) -> Result<Vec<TgAccount>> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM tg_accounts WHERE is_active ORDER BY id"
        );
        let rows = sqlx::query(&query)
            .fetch_all(self.client.pool())
            .await
            .map_err(|e| db_err("load_active_accounts", e))?;

        rows.iter().map(account_from_row).collect()
    }

    async fn record_account_success(&self, account_id: &str) -> Result<()> {
        sqlx::query("UPDATE tg_accounts SET last_used_at = now(), error_count = 0 WHERE id = $1")
            .bind(account_id)
            .execute(self.client.pool())
            .await
            .map_err(|e| db_err("record_account_success", e))?;
        Ok(())
    }

    async fn record_account_error(&self, account_id: &str) -> Result<u32> {
        // Single statement so concurrent workers cannot lose increments.
        let row = sqlx::query(
            "UPDATE tg_accounts
             SET error_count = error_count + 1,
                 is_active = CASE WHEN error_count + 1 >= $2 THEN FALSE ELSE is_active END
             WHERE id = $1
             RETURNING error_count, is_active",
        )
        .bind(account_id)
        .bind(TG_ACCOUNT_ERROR_THRESHOLD as i32)
        .fetch_one(self.client.pool())
        .await
        .map_err(|e| db_err("record_account_error", e))?;

        let count: i32 = row
            .try_get("error_count")
            .map_err(|e| db_err("record_account_error", e))?;
        let still_active: bool = row
            .try_get("is_active")
            .map_err(|e| db_err("record_account_error", e))?;

        if !still_active {
            metrics().accounts_deactivated.inc();
            warn!(account_id, error_count = count, "Telegram account deactivated");
        }
        Ok(count.max(0) as u32)
    }

    async fn get_cached(&self, platform: Platform, e164: &str) -> Result<Option<CachedStatus>> {
        let row = sqlx::query(
            "SELECT status, checked_at, meta FROM check_cache
             WHERE platform = $1 AND e164 = $2 AND expires_at > now()",
        )
        .bind(platform.as_str())
        .bind(e164)
        .fetch_optional(self.client.pool())
        .await
        .map_err(|e| db_err("get_cached", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let meta_raw: String = row.try_get("meta").map_err(|e| db_err("get_cached", e))?;
        Ok(Some(CachedStatus {
            status: row.try_get("status").map_err(|e| db_err("get_cached", e))?,
            checked_at: row
                .try_get("checked_at")
                .map_err(|e| db_err("get_cached", e))?,
            meta: serde_json::from_str(&meta_raw).unwrap_or_default(),
        }))
    }

    async fn put_cached(
        &self,
        platform: Platform,
        e164: &str,
        entry: &CachedStatus,
        ttl_secs: u64,
    ) -> Result<()> {
        let meta = serde_json::to_string(&entry.meta)?;
        sqlx::query(
            "INSERT INTO check_cache (platform, e164, status, checked_at, meta, expires_at)
             VALUES ($1, $2, $3, $4, $5, now() + ($6::bigint * INTERVAL '1 second'))
             ON CONFLICT (platform, e164) DO UPDATE
             SET status = EXCLUDED.status,
                 checked_at = EXCLUDED.checked_at,
                 meta = EXCLUDED.meta,
                 expires_at = EXCLUDED.expires_at",
        )
        .bind(platform.as_str())
        .bind(e164)
        .bind(&entry.status)
        .bind(entry.checked_at)
        .bind(&meta)
        .bind(ttl_secs as i64)
        .execute(self.client.pool())
        .await
        .map_err(|e| db_err("put_cached", e))?;
        Ok(())
    }
}
