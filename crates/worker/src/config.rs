//! Worker pool configuration.

use numwatch_core::limits::{
    MAX_CHECK_ATTEMPTS, SWEEP_INTERVAL_SECS, WA_STAGE1_TIMEOUT_MS, WA_STAGE2_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};

/// WhatsApp checker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Base URL of the free stage-1 profile endpoint
    #[serde(default = "default_wa_me_url")]
    pub wa_me_url: String,
    /// Base URL of the paid verification provider
    pub provider_url: String,
    /// Bearer key for the provider
    pub provider_key: String,
    #[serde(default = "default_stage1_timeout_ms")]
    pub stage1_timeout_ms: u64,
    #[serde(default = "default_stage2_timeout_ms")]
    pub stage2_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_wa_me_url() -> String {
    "https://wa.me".to_string()
}

fn default_stage1_timeout_ms() -> u64 {
    WA_STAGE1_TIMEOUT_MS
}

fn default_stage2_timeout_ms() -> u64 {
    WA_STAGE2_TIMEOUT_MS
}

fn default_max_attempts() -> u32 {
    MAX_CHECK_ATTEMPTS
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            wa_me_url: default_wa_me_url(),
            provider_url: "http://localhost:8091".to_string(),
            provider_key: String::new(),
            stage1_timeout_ms: default_stage1_timeout_ms(),
            stage2_timeout_ms: default_stage2_timeout_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Telegram checker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Base URL of the MTProto bridge sidecar
    pub bridge_url: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bridge_url: "http://localhost:8092".to_string(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Export sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Bucket exports are uploaded to
    pub bucket: String,
    /// Public base URL the signed download links are built on
    pub public_base_url: String,
    /// Secret for HMAC link signatures
    pub signing_secret: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            bucket: "numwatch-exports".to_string(),
            public_base_url: "http://localhost:9000/numwatch-exports".to_string(),
            signing_secret: "dev-secret".to_string(),
        }
    }
}

/// Top-level worker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_wa_workers")]
    pub wa_workers: usize,
    #[serde(default = "default_tg_workers")]
    pub tg_workers: usize,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

fn default_wa_workers() -> usize {
    4
}

fn default_tg_workers() -> usize {
    2
}

fn default_sweep_interval_secs() -> u64 {
    SWEEP_INTERVAL_SECS
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            wa_workers: default_wa_workers(),
            tg_workers: default_tg_workers(),
            sweep_interval_secs: default_sweep_interval_secs(),
            whatsapp: WhatsAppConfig::default(),
            telegram: TelegramConfig::default(),
            export: ExportConfig::default(),
        }
    }
}
