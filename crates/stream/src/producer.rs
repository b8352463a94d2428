//! Stream producer: XADD with an approximate length bound.

use async_trait::async_trait;
use numwatch_core::{
    streams, BulkItemMessage, Error, ItemPublisher, ProgressMessage, Result, TgCheckMessage,
    WaStage2Message,
};
use telemetry::metrics;
use tracing::debug;

use crate::client::RedisClient;

/// Publishes queue messages onto the Redis streams.
#[derive(Clone)]
pub struct Producer {
    client: RedisClient,
}

impl Producer {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    /// Appends a field map to a stream, trimming to the configured
    /// approximate maximum length.
    pub async fn publish(&self, stream: &str, fields: &[(String, String)]) -> Result<String> {
        let mut conn = self.client.connection();
        let maxlen = self.client.config().stream_maxlen;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(maxlen)
            .arg("*");
        for (key, value) in fields {
            cmd.arg(key).arg(value);
        }

        let id: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::stream(format!("XADD {stream} failed: {e}")))?;

        debug!(stream = stream, id = %id, "Published message");
        Ok(id)
    }
}

#[async_trait]
impl ItemPublisher for Producer {
    async fn publish_bulk_item(&self, msg: &BulkItemMessage) -> Result<()> {
        self.publish(streams::BULK_ITEMS, &msg.to_fields()).await?;
        metrics().items_enqueued.inc();
        Ok(())
    }

    async fn publish_wa_stage2(&self, msg: &WaStage2Message) -> Result<()> {
        self.publish(streams::WA_STAGE2, &msg.to_fields()).await?;
        Ok(())
    }

    async fn publish_tg_check(&self, msg: &TgCheckMessage) -> Result<()> {
        self.publish(streams::TG_CHECKS, &msg.to_fields()).await?;
        metrics().items_enqueued.inc();
        Ok(())
    }

    async fn publish_progress(&self, msg: &ProgressMessage) -> Result<()> {
        self.publish(streams::BULK_PROGRESS, &msg.to_fields())
            .await?;
        metrics().progress_events.inc();
        Ok(())
    }
}
