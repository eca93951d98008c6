//! Redis Stream publisher.
//!
//! Appends committed-message events to the shared events stream, from
//! which every gateway node reads every event. The stream is trimmed
//! approximately to a fixed length on each append.

use async_trait::async_trait;
use redis::streams::StreamMaxlen;
use redis::AsyncCommands;
use tracing::instrument;

use relay_core::events::MessageCommittedEvent;
use relay_core::traits::{EventPublisher, RepoResult};

use super::EVENT_FIELD;
use crate::pool::{RedisPool, RedisPoolError, RedisResult};

/// Default approximate cap on stored events
pub const DEFAULT_STREAM_MAX_LEN: usize = 100_000;

/// Redis Stream publisher for committed-message events
#[derive(Clone)]
pub struct RedisEventPublisher {
    pool: RedisPool,
    stream: String,
    max_len: usize,
}

impl RedisEventPublisher {
    /// Create a new publisher appending to `stream`
    #[must_use]
    pub fn new(pool: RedisPool, stream: impl Into<String>) -> Self {
        Self {
            pool,
            stream: stream.into(),
            max_len: DEFAULT_STREAM_MAX_LEN,
        }
    }

    #[must_use]
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }

    async fn append(&self, payload: &str) -> RedisResult<String> {
        let mut conn = self.pool.get().await?;
        let entry_id: String = conn
            .xadd_maxlen(
                &self.stream,
                StreamMaxlen::Approx(self.max_len),
                "*",
                &[(EVENT_FIELD, payload)],
            )
            .await?;
        Ok(entry_id)
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    #[instrument(skip(self, event), fields(message_id = %event.message_id, channel_id = %event.channel_id, seq_id = event.seq_id))]
    async fn publish(&self, event: &MessageCommittedEvent) -> RepoResult<u32> {
        let payload = serde_json::to_string(event).map_err(RedisPoolError::from)?;
        let entry_id = self.append(&payload).await?;

        tracing::debug!(
            stream = %self.stream,
            entry_id = %entry_id,
            fanout_mode = %event.fanout_mode(),
            "Published event"
        );

        // One durable append; readers are not known at this point
        Ok(1)
    }
}
