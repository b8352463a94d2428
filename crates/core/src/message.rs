//! Queue message schemas.
//!
//! Stream entries are flat string field maps (the native Redis Streams
//! shape), so every message knows how to render itself to fields and parse
//! itself back. Each carries an idempotency key so redelivery is a safe
//! no-op at the item level.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::status::{parse_platforms, platforms_to_string, Platform};

/// Stream and consumer-group names.
pub mod streams {
    /// Per-item fan-out for a new bulk job; consumed by both platform pools.
    pub const BULK_ITEMS: &str = "bulk:items";
    /// Stage-1-inconclusive WhatsApp items awaiting the paid API.
    pub const WA_STAGE2: &str = "wa:stage2";
    /// Telegram-only item checks.
    pub const TG_CHECKS: &str = "tg:checks";
    /// Per-item progress events drained by the aggregator.
    pub const BULK_PROGRESS: &str = "bulk:progress";

    pub const GROUP_WA: &str = "wa";
    pub const GROUP_TG: &str = "tg";
    pub const GROUP_AGGREGATOR: &str = "aggregator";
}

fn required(fields: &HashMap<String, String>, key: &str) -> Result<String> {
    fields
        .get(key)
        .cloned()
        .ok_or_else(|| Error::MalformedMessage(key.to_string()))
}

/// Generates a fresh idempotency key.
pub fn idempotency_key() -> String {
    Uuid::new_v4().to_string()
}

/// One number of a bulk job, carrying the job's full platform set so each
/// platform pool can decide whether the item is for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemMessage {
    pub job_id: String,
    pub e164: String,
    pub platforms: Vec<Platform>,
    pub idempotency_key: String,
}

impl BulkItemMessage {
    pub fn new(job_id: impl Into<String>, e164: impl Into<String>, platforms: Vec<Platform>) -> Self {
        Self {
            job_id: job_id.into(),
            e164: e164.into(),
            platforms,
            idempotency_key: idempotency_key(),
        }
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("job_id".into(), self.job_id.clone()),
            ("e164".into(), self.e164.clone()),
            ("platforms".into(), platforms_to_string(&self.platforms)),
            ("idempotency_key".into(), self.idempotency_key.clone()),
        ]
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            job_id: required(fields, "job_id")?,
            e164: required(fields, "e164")?,
            platforms: parse_platforms(&required(fields, "platforms")?)?,
            idempotency_key: required(fields, "idempotency_key")?,
        })
    }
}

/// A WhatsApp item whose stage-1 probe was inconclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct WaStage2Message {
    pub job_id: String,
    pub e164: String,
    /// Stage-1 probe result, carried so the terminal stage-2 write records
    /// both stages in the result metadata.
    pub stage1_meta: Value,
    pub idempotency_key: String,
}

impl WaStage2Message {
    pub fn new(job_id: impl Into<String>, e164: impl Into<String>, stage1_meta: Value) -> Self {
        Self {
            job_id: job_id.into(),
            e164: e164.into(),
            stage1_meta,
            idempotency_key: idempotency_key(),
        }
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("job_id".into(), self.job_id.clone()),
            ("e164".into(), self.e164.clone()),
            ("stage1_meta".into(), self.stage1_meta.to_string()),
            ("idempotency_key".into(), self.idempotency_key.clone()),
        ]
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            job_id: required(fields, "job_id")?,
            e164: required(fields, "e164")?,
            stage1_meta: fields
                .get("stage1_meta")
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(Value::Null),
            idempotency_key: required(fields, "idempotency_key")?,
        })
    }
}

/// A Telegram-only item check (used when a job requests only Telegram, so
/// the WhatsApp group never sees the message at all).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TgCheckMessage {
    pub job_id: String,
    pub e164: String,
    pub idempotency_key: String,
}

impl TgCheckMessage {
    pub fn new(job_id: impl Into<String>, e164: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            e164: e164.into(),
            idempotency_key: idempotency_key(),
        }
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("job_id".into(), self.job_id.clone()),
            ("e164".into(), self.e164.clone()),
            ("idempotency_key".into(), self.idempotency_key.clone()),
        ]
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            job_id: required(fields, "job_id")?,
            e164: required(fields, "e164")?,
            idempotency_key: required(fields, "idempotency_key")?,
        })
    }
}

/// Kind of progress event a worker emits after writing an item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    WaUpdate,
    TgUpdate,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaUpdate => "wa_update",
            Self::TgUpdate => "tg_update",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "wa_update" => Ok(Self::WaUpdate),
            "tg_update" => Ok(Self::TgUpdate),
            other => Err(Error::validation(format!("unknown progress kind: {other}"))),
        }
    }
}

/// Emitted after every item status write; the aggregator treats these as
/// hints and recomputes from item state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressMessage {
    pub job_id: String,
    pub kind: ProgressKind,
    pub e164: String,
    pub status: String,
}

impl ProgressMessage {
    pub fn new(
        job_id: impl Into<String>,
        kind: ProgressKind,
        e164: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            e164: e164.into(),
            status: status.into(),
        }
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("job_id".into(), self.job_id.clone()),
            ("kind".into(), self.kind.as_str().to_string()),
            ("e164".into(), self.e164.clone()),
            ("status".into(), self.status.clone()),
        ]
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            job_id: required(fields, "job_id")?,
            kind: ProgressKind::parse(&required(fields, "kind")?)?,
            e164: required(fields, "e164")?,
            status: required(fields, "status")?,
        })
    }
}
