//! Table schemas, applied idempotently at startup.
//!
//! Summaries and cache metadata are stored as JSON text so the row shape
//! stays stable while the histogram shape evolves.

/// Job records. `status` transitions are guarded in SQL (compare-and-set
/// on the current status), so concurrent sweeps cannot double-complete.
pub const CREATE_JOBS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id               TEXT PRIMARY KEY,
    tenant           TEXT NOT NULL,
    status           TEXT NOT NULL,
    total            BIGINT NOT NULL,
    processed        BIGINT NOT NULL DEFAULT 0,
    success          BIGINT NOT NULL DEFAULT 0,
    failed           BIGINT NOT NULL DEFAULT 0,
    platforms        TEXT NOT NULL,
    country_default  TEXT,
    duplicates_count BIGINT NOT NULL DEFAULT 0,
    invalid_count    BIGINT NOT NULL DEFAULT 0,
    summary          TEXT NOT NULL DEFAULT '{}',
    export_url       TEXT,
    started_at       TIMESTAMPTZ,
    finished_at      TIMESTAMPTZ,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const CREATE_JOBS_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status)
"#;

/// One row per unique normalized number per job. The composite key makes
/// item creation and status writes idempotent under redelivery.
pub const CREATE_JOB_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS job_items (
    job_id        TEXT NOT NULL REFERENCES jobs(id),
    e164          TEXT NOT NULL,
    wa_status     TEXT,
    tg_status     TEXT,
    wa_checked_at TIMESTAMPTZ,
    tg_checked_at TIMESTAMPTZ,
    error         TEXT,
    PRIMARY KEY (job_id, e164)
)
"#;

/// Telegram account pool. Counters are mutated with atomic increments
/// because workers in separate processes share the rows.
pub const CREATE_TG_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tg_accounts (
    id           TEXT PRIMARY KEY,
    phone_label  TEXT NOT NULL,
    api_id       TEXT NOT NULL,
    api_hash     TEXT NOT NULL,
    session      TEXT NOT NULL,
    proxy_url    TEXT,
    daily_limit  INTEGER NOT NULL DEFAULT 1000,
    last_used_at TIMESTAMPTZ,
    error_count  INTEGER NOT NULL DEFAULT 0,
    is_active    BOOLEAN NOT NULL DEFAULT TRUE
)
"#;

/// Durable half of the result cache. Expiry is checked at read time
/// rather than reaped, matching the TTL semantics of the fast layer.
pub const CREATE_CHECK_CACHE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS check_cache (
    platform   TEXT NOT NULL,
    e164       TEXT NOT NULL,
    status     TEXT NOT NULL,
    checked_at TIMESTAMPTZ NOT NULL,
    meta       TEXT NOT NULL DEFAULT '{}',
    expires_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (platform, e164)
)
"#;

/// All DDL statements in creation order.
pub const ALL_TABLES: &[&str] = &[
    CREATE_JOBS_TABLE,
    CREATE_JOBS_STATUS_INDEX,
    CREATE_JOB_ITEMS_TABLE,
    CREATE_TG_ACCOUNTS_TABLE,
    CREATE_CHECK_CACHE_TABLE,
];
