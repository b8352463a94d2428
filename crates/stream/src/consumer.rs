//! Consumer-group reader with acknowledgment and stale-message reclaim.
//!
//! At-least-once delivery: callers ack only after the item write succeeds,
//! and messages left pending by a dead consumer are reclaimed via
//! XPENDING + XCLAIM once they cross the idle threshold.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use numwatch_core::{Error, Result};
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::client::RedisClient;

/// A decoded stream entry awaiting acknowledgment.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

fn decode_entry(id: &StreamId) -> StreamEntry {
    let fields = id
        .map
        .iter()
        .filter_map(|(k, v)| {
            redis::from_redis_value::<String>(v)
                .ok()
                .map(|s| (k.clone(), s))
        })
        .collect();
    StreamEntry {
        id: id.id.clone(),
        fields,
    }
}

/// Consumer bound to one (stream, group) pair.
pub struct Consumer {
    client: RedisClient,
    stream: String,
    group: String,
    consumer_name: String,
    group_ensured: AtomicBool,
}

impl Consumer {
    pub fn new(
        client: RedisClient,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            stream: stream.into(),
            group: group.into(),
            consumer_name: consumer_name.into(),
            group_ensured: AtomicBool::new(false),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Creates the consumer group if needed; BUSYGROUP means another
    /// consumer got there first.
    async fn ensure_group(&self) -> Result<()> {
        if self.group_ensured.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut conn = self.client.connection();
        let created: std::result::Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "0")
            .await;

        match created {
            Ok(()) => {
                info!(stream = %self.stream, group = %self.group, "Created consumer group");
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {}
            Err(e) => {
                return Err(Error::stream(format!(
                    "XGROUP CREATE {} {} failed: {e}",
                    self.stream, self.group
                )));
            }
        }

        self.group_ensured.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Fetches up to `batch_size` new messages, blocking at most the
    /// configured bound so the caller can poll its shutdown flag.
    pub async fn fetch(&self) -> Result<Vec<StreamEntry>> {
        self.ensure_group().await?;

        let config = self.client.config();
        let mut conn = self.client.connection();

        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer_name)
            .count(config.batch_size)
            .block(config.block_ms as usize);

        let reply: StreamReadReply = conn
            .xread_options(&[self.stream.as_str()], &[">"], &opts)
            .await
            .map_err(|e| Error::stream(format!("XREADGROUP {} failed: {e}", self.stream)))?;

        let entries: Vec<StreamEntry> = reply
            .keys
            .iter()
            .flat_map(|key| key.ids.iter().map(decode_entry))
            .collect();

        if !entries.is_empty() {
            metrics().messages_consumed.inc_by(entries.len() as u64);
            debug!(
                stream = %self.stream,
                group = %self.group,
                count = entries.len(),
                "Fetched messages"
            );
        }

        Ok(entries)
    }

    /// Acknowledges a processed message.
    pub async fn ack(&self, id: &str) -> Result<()> {
        let mut conn = self.client.connection();
        let _: i64 = conn
            .xack(&self.stream, &self.group, &[id])
            .await
            .map_err(|e| Error::stream(format!("XACK {} failed: {e}", self.stream)))?;
        metrics().messages_acked.inc();
        Ok(())
    }

    /// Reclaims messages pending longer than the idle threshold (their
    /// consumer died before acking) and returns them for reprocessing.
    pub async fn claim_stale(&self) -> Result<Vec<StreamEntry>> {
        self.ensure_group().await?;

        let config = self.client.config();
        let mut conn = self.client.connection();

        let pending: StreamPendingCountReply = conn
            .xpending_count(&self.stream, &self.group, "-", "+", config.batch_size)
            .await
            .map_err(|e| Error::stream(format!("XPENDING {} failed: {e}", self.stream)))?;

        let stale_ids: Vec<String> = pending
            .ids
            .iter()
            .filter(|p| p.last_delivered_ms as u64 >= config.claim_idle_ms)
            .map(|p| p.id.clone())
            .collect();

        if stale_ids.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: StreamClaimReply = conn
            .xclaim(
                &self.stream,
                &self.group,
                &self.consumer_name,
                config.claim_idle_ms,
                &stale_ids,
            )
            .await
            .map_err(|e| Error::stream(format!("XCLAIM {} failed: {e}", self.stream)))?;

        let entries: Vec<StreamEntry> = claimed.ids.iter().map(decode_entry).collect();

        if !entries.is_empty() {
            metrics().messages_reclaimed.inc_by(entries.len() as u64);
            warn!(
                stream = %self.stream,
                group = %self.group,
                count = entries.len(),
                "Reclaimed stale pending messages"
            );
        }

        Ok(entries)
    }
}
