//! Telegram checker over a pooled set of provisioned accounts.
//!
//! The MTProto protocol itself lives behind the [`TelegramSession`] seam
//! (production talks to a bridge sidecar); this module owns the pool
//! policy: round-robin selection, flood-wait cooldowns, and error-count
//! deactivation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use numwatch_core::limits::TG_ACCOUNT_ERROR_THRESHOLD;
use numwatch_core::{JobStore, Result, TgAccount, TgStatus};
use parking_lot::Mutex;
use serde_json::{json, Value};
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::config::TelegramConfig;

/// RPC error for a number with no Telegram account. A valid terminal
/// outcome, not a failure.
pub const PHONE_NOT_OCCUPIED: &str = "PHONE_NOT_OCCUPIED";

/// Parses the wait seconds out of a `FLOOD_WAIT_N` RPC error.
pub fn parse_flood_wait(error: &str) -> Option<u64> {
    let idx = error.find("FLOOD_WAIT_")?;
    let rest = &error[idx + "FLOOD_WAIT_".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Contact resolution through one pool account's credentials.
///
/// `Ok(true)` means the number has an account; errors carry the raw RPC
/// error string so the checker can classify flood waits and terminal
/// outcomes.
#[async_trait]
pub trait TelegramSession: Send + Sync {
    async fn resolve(
        &self,
        account: &TgAccount,
        e164: &str,
    ) -> std::result::Result<bool, String>;
}

/// Production session: per-call HTTP request to the MTProto bridge
/// sidecar, which holds the actual protocol implementation.
pub struct BridgeSession {
    http: reqwest::Client,
    base_url: String,
}

impl BridgeSession {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.bridge_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TelegramSession for BridgeSession {
    async fn resolve(
        &self,
        account: &TgAccount,
        e164: &str,
    ) -> std::result::Result<bool, String> {
        let url = format!("{}/v1/resolve", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "api_id": account.api_id,
                "api_hash": account.api_hash,
                "session": account.session,
                "proxy_url": account.proxy_url,
                "phone": e164,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let body: Value = response.json().await.map_err(|e| e.to_string())?;

        if let Some(rpc_error) = body.get("error").and_then(Value::as_str) {
            return Err(rpc_error.to_string());
        }

        body.get("registered")
            .and_then(Value::as_bool)
            .ok_or_else(|| "malformed bridge response".to_string())
    }
}

/// Result of one Telegram check.
#[derive(Debug, Clone)]
pub struct TgCheckResult {
    pub status: TgStatus,
    pub meta: Value,
    pub error: Option<String>,
}

struct PoolState {
    accounts: Vec<TgAccount>,
    cursor: usize,
    cooldown_until: HashMap<String, Instant>,
}

impl PoolState {
    fn active_count(&self) -> usize {
        self.accounts.iter().filter(|a| a.is_active).count()
    }
}

pub struct TelegramChecker {
    session: Arc<dyn TelegramSession>,
    store: Arc<dyn JobStore>,
    config: TelegramConfig,
    pool: Mutex<PoolState>,
}

impl TelegramChecker {
    /// Loads the active account pool from the store.
    pub async fn load(
        session: Arc<dyn TelegramSession>,
        store: Arc<dyn JobStore>,
        config: TelegramConfig,
    ) -> Result<Self> {
        let accounts = store.load_active_accounts().await?;
        info!(count = accounts.len(), "Loaded Telegram account pool");
        Ok(Self::with_accounts(session, store, config, accounts))
    }

    pub fn with_accounts(
        session: Arc<dyn TelegramSession>,
        store: Arc<dyn JobStore>,
        config: TelegramConfig,
        accounts: Vec<TgAccount>,
    ) -> Self {
        metrics()
            .tg_accounts_active
            .set(accounts.iter().filter(|a| a.is_active).count() as u64);
        Self {
            session,
            store,
            config,
            pool: Mutex::new(PoolState {
                accounts,
                cursor: 0,
                cooldown_until: HashMap::new(),
            }),
        }
    }

    /// Round-robin pick, skipping deactivated and cooling accounts.
    fn next_account(&self) -> Option<TgAccount> {
        let mut pool = self.pool.lock();
        let n = pool.accounts.len();
        let now = Instant::now();

        for _ in 0..n {
            let i = pool.cursor % n;
            pool.cursor = pool.cursor.wrapping_add(1);

            let account = &pool.accounts[i];
            if !account.is_active {
                continue;
            }
            if let Some(until) = pool.cooldown_until.get(&account.id) {
                if now < *until {
                    continue;
                }
            }
            return Some(account.clone());
        }
        None
    }

    fn cool_account(&self, account_id: &str, secs: u64) {
        let mut pool = self.pool.lock();
        pool.cooldown_until.insert(
            account_id.to_string(),
            Instant::now() + Duration::from_secs(secs),
        );
    }

    fn deactivate_local(&self, account_id: &str) {
        let mut pool = self.pool.lock();
        if let Some(account) = pool.accounts.iter_mut().find(|a| a.id == account_id) {
            account.is_active = false;
        }
        metrics().tg_accounts_active.set(pool.active_count() as u64);
    }

    async fn account_succeeded(&self, account_id: &str) {
        if let Err(e) = self.store.record_account_success(account_id).await {
            warn!(account_id, error = %e, "Failed to record account success");
        }
    }

    async fn account_failed(&self, account_id: &str, rpc_error: &str) {
        match self.store.record_account_error(account_id).await {
            Ok(count) => {
                warn!(account_id, error_count = count, rpc_error, "Telegram account error");
                if count >= TG_ACCOUNT_ERROR_THRESHOLD {
                    self.deactivate_local(account_id);
                }
            }
            Err(e) => warn!(account_id, error = %e, "Failed to record account error"),
        }
    }

    /// Checks one number, rotating through the pool. Bounded attempts;
    /// pool exhaustion resolves `Unknown` immediately so the job can still
    /// converge.
    pub async fn check(&self, e164: &str) -> TgCheckResult {
        metrics().tg_checks.inc();
        let started = Instant::now();
        let mut attempts: Vec<Value> = Vec::new();

        for _ in 0..self.config.max_attempts {
            let Some(account) = self.next_account() else {
                return TgCheckResult {
                    status: TgStatus::Unknown,
                    meta: json!({"attempts": attempts, "error": "account pool exhausted"}),
                    error: Some("telegram account pool exhausted".to_string()),
                };
            };

            match self.session.resolve(&account, e164).await {
                Ok(registered) => {
                    self.account_succeeded(&account.id).await;
                    metrics()
                        .tg_check_latency_ms
                        .observe(started.elapsed().as_millis() as u64);
                    attempts.push(json!({"account": account.phone_label, "outcome": "resolved"}));
                    let status = if registered {
                        TgStatus::Registered
                    } else {
                        TgStatus::NotRegistered
                    };
                    return TgCheckResult {
                        status,
                        meta: json!({"attempts": attempts}),
                        error: None,
                    };
                }
                Err(rpc_error) => {
                    if rpc_error.contains(PHONE_NOT_OCCUPIED) {
                        // Terminal outcome, not an account fault.
                        self.account_succeeded(&account.id).await;
                        attempts.push(
                            json!({"account": account.phone_label, "outcome": "phone_not_occupied"}),
                        );
                        return TgCheckResult {
                            status: TgStatus::NotRegistered,
                            meta: json!({"attempts": attempts}),
                            error: None,
                        };
                    }

                    if let Some(secs) = parse_flood_wait(&rpc_error) {
                        metrics().flood_waits.inc();
                        debug!(account = %account.phone_label, secs, "Flood wait, cooling account");
                        self.cool_account(&account.id, secs);
                        attempts.push(json!({
                            "account": account.phone_label,
                            "outcome": "flood_wait",
                            "wait_secs": secs,
                        }));
                        continue;
                    }

                    self.account_failed(&account.id, &rpc_error).await;
                    attempts.push(json!({
                        "account": account.phone_label,
                        "outcome": "error",
                        "rpc_error": rpc_error,
                    }));
                }
            }
        }

        TgCheckResult {
            status: TgStatus::Unknown,
            meta: json!({"attempts": attempts, "error": "attempts exhausted"}),
            error: Some("telegram check attempts exhausted".to_string()),
        }
    }
}
