//! Two-stage WhatsApp checker.
//!
//! Stage 1 is a free probe against the public wa.me profile endpoint; it
//! can only resolve a business signal. Anything inconclusive escalates to
//! stage 2, the paid provider API, which is authoritative for
//! registered/not-registered.

use std::time::{Duration, Instant};

use numwatch_core::{backoff_delay, WaStatus};
use reqwest::StatusCode;
use serde_json::{json, Value};
use telemetry::metrics;
use tracing::{debug, warn};

use crate::config::WhatsAppConfig;

/// Result of one checker stage.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub status: WaStatus,
    pub meta: Value,
    pub error: Option<String>,
}

impl StageResult {
    fn unknown(meta: Value, error: impl Into<String>) -> Self {
        Self {
            status: WaStatus::Unknown,
            meta,
            error: Some(error.into()),
        }
    }
}

/// Parses a Retry-After header value (seconds form only).
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

pub struct WhatsAppChecker {
    stage1_http: reqwest::Client,
    stage2_http: reqwest::Client,
    config: WhatsAppConfig,
}

impl WhatsAppChecker {
    pub fn new(config: WhatsAppConfig) -> Self {
        let stage1_http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.stage1_timeout_ms))
            .build()
            .unwrap_or_default();
        let stage2_http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.stage2_timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            stage1_http,
            stage2_http,
            config,
        }
    }

    /// Stage 1: free probe. Resolves `BusinessActive` on a business
    /// signal; everything else (including errors) stays `Unknown` so the
    /// pipeline escalates to stage 2.
    pub async fn stage1(&self, e164: &str) -> StageResult {
        metrics().wa_stage1_checks.inc();
        let started = Instant::now();

        let digits = e164.trim_start_matches('+');
        let url = format!("{}/{digits}", self.config.wa_me_url.trim_end_matches('/'));

        let response = match self.stage1_http.head(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(e164, error = %e, "Stage 1 probe failed");
                return StageResult::unknown(
                    json!({"stage": 1, "method": "wa_me_probe", "error": e.to_string()}),
                    e.to_string(),
                );
            }
        };

        let final_url = response.url().to_string();
        let status_code = response.status().as_u16();
        let business_header = response.headers().contains_key("x-wa-business");
        let business = business_header || final_url.contains("business");

        metrics()
            .wa_check_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        let meta = json!({
            "stage": 1,
            "method": "wa_me_probe",
            "status_code": status_code,
            "final_url": final_url,
            "business_signal": business,
        });

        if business {
            StageResult {
                status: WaStatus::BusinessActive,
                meta,
                error: None,
            }
        } else {
            StageResult {
                status: WaStatus::Unknown,
                meta,
                error: None,
            }
        }
    }

    /// Stage 2: paid provider API with bounded retries. 429 honours
    /// Retry-After; other 4xx responses are final; 5xx and timeouts back
    /// off and retry.
    pub async fn stage2(&self, e164: &str) -> StageResult {
        metrics().wa_stage2_checks.inc();
        let started = Instant::now();

        let url = format!(
            "{}/v1/whatsapp/check",
            self.config.provider_url.trim_end_matches('/')
        );

        let mut last_error = String::from("no attempts made");

        for attempt in 0..self.config.max_attempts {
            // Each failure branch sleeps exactly once before the retry, so
            // an honoured Retry-After is not stacked with backoff.
            let has_retry = attempt + 1 < self.config.max_attempts;

            let response = match self
                .stage2_http
                .post(&url)
                .bearer_auth(&self.config.provider_key)
                .json(&json!({"e164": e164}))
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(e164, attempt, error = %e, "Stage 2 request failed");
                    last_error = e.to_string();
                    if has_retry {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let delay = retry_after
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| backoff_delay(attempt));
                warn!(e164, attempt, delay_ms = delay.as_millis() as u64, "Provider rate limited");
                last_error = "provider rate limited".to_string();
                if has_retry {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            if status.is_client_error() {
                // Final: retrying a rejected request cannot help.
                let body = response.text().await.unwrap_or_default();
                return StageResult::unknown(
                    json!({
                        "stage": 2,
                        "method": "provider_api",
                        "status_code": status.as_u16(),
                        "body": body,
                    }),
                    format!("provider rejected request: {status}"),
                );
            }

            if status.is_server_error() {
                warn!(e164, attempt, status = status.as_u16(), "Provider server error");
                last_error = format!("provider error: {status}");
                if has_retry {
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                continue;
            }

            let body: Value = match response.json().await {
                Ok(b) => b,
                Err(e) => {
                    last_error = format!("malformed provider response: {e}");
                    if has_retry {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                    continue;
                }
            };

            metrics()
                .wa_check_latency_ms
                .observe(started.elapsed().as_millis() as u64);

            let meta = json!({
                "stage": 2,
                "method": "provider_api",
                "attempt": attempt + 1,
                "response": body.clone(),
            });

            return match body.get("registered").and_then(Value::as_bool) {
                Some(true) => StageResult {
                    status: WaStatus::Registered,
                    meta,
                    error: None,
                },
                Some(false) => StageResult {
                    status: WaStatus::NotRegistered,
                    meta,
                    error: None,
                },
                None => StageResult::unknown(meta, "provider response missing 'registered'"),
            };
        }

        StageResult::unknown(
            json!({
                "stage": 2,
                "method": "provider_api",
                "attempts": self.config.max_attempts,
                "error": last_error.clone(),
            }),
            last_error,
        )
    }

    /// Full pipeline for the synchronous quick path: stage 1, then stage 2
    /// if still unresolved. Meta records every stage that ran.
    pub async fn check(&self, e164: &str) -> StageResult {
        let first = self.stage1(e164).await;
        if first.status != WaStatus::Unknown {
            return StageResult {
                status: first.status,
                meta: json!({"stage1": first.meta}),
                error: first.error,
            };
        }

        let second = self.stage2(e164).await;
        StageResult {
            status: second.status,
            meta: json!({"stage1": first.meta, "stage2": second.meta}),
            error: second.error,
        }
    }
}
