//! Redis Stream subscriber.
//!
//! Each process reads the events stream with its own `XREAD BLOCK` cursor
//! and fans every parsed event into a local broadcast channel. The cursor is
//! persisted per node, so events appended while the node reconnects or
//! restarts are read on its return instead of being lost. Local consumers
//! keep their own read position on the broadcast channel, so a slow one lags
//! on its own without stealing events from the others.

use redis::streams::{StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use tokio::sync::{broadcast, mpsc};

use relay_core::events::MessageCommittedEvent;

use super::EVENT_FIELD;

/// Error type for subscriber operations
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for subscriber operations
pub type SubscriberResult<T> = Result<T, SubscriberError>;

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Redis connection URL
    pub redis_url: String,
    /// Stream carrying committed-message events
    pub stream: String,
    /// Owner of the persisted cursor; one per gateway node
    pub node_id: String,
    /// Channel buffer size for broadcast
    pub broadcast_buffer: usize,
    /// Reconnection delay in milliseconds
    pub reconnect_delay_ms: u64,
    /// How long one XREAD waits for new entries
    pub block_ms: usize,
    /// Entries fetched per XREAD
    pub batch_size: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            stream: "relay:events".to_string(),
            node_id: "node-0".to_string(),
            broadcast_buffer: 1024,
            reconnect_delay_ms: 1000,
            block_ms: 5_000,
            batch_size: 256,
        }
    }
}

impl SubscriberConfig {
    /// Key holding this node's last read entry id
    pub fn cursor_key(&self) -> String {
        format!("{}:cursor:{}", self.stream, self.node_id)
    }
}

/// Parse one event payload; malformed payloads are logged and dropped
pub fn parse_event(payload: &str) -> Option<MessageCommittedEvent> {
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed event payload");
            None
        }
    }
}

/// Where a node with no cursor of its own starts reading
fn starting_id(stored: Option<String>, newest: Option<String>) -> String {
    stored.or(newest).unwrap_or_else(|| "0-0".to_string())
}

/// Events of one XREAD reply plus the id to continue after. Unreadable
/// entries still advance the cursor.
fn read_batch(reply: StreamReadReply) -> (Vec<MessageCommittedEvent>, Option<String>) {
    let mut events = Vec::new();
    let mut last_id = None;
    for key in reply.keys {
        for entry in key.ids {
            match entry.get::<String>(EVENT_FIELD) {
                Some(payload) => events.extend(parse_event(&payload)),
                None => tracing::warn!(entry_id = %entry.id, "Stream entry without payload"),
            }
            last_id = Some(entry.id);
        }
    }
    (events, last_id)
}

/// Redis Stream subscriber for committed-message events
pub struct EventSubscriber {
    broadcast_tx: broadcast::Sender<MessageCommittedEvent>,
    shutdown_tx: mpsc::Sender<()>,
}

impl EventSubscriber {
    /// Create a new subscriber and start the background listener
    #[must_use]
    pub fn start(config: SubscriberConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.broadcast_buffer);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(Self::listener_loop(config, broadcast_tx.clone(), shutdown_rx));

        Self {
            broadcast_tx,
            shutdown_tx,
        }
    }

    /// Background listener loop, reconnecting after failures
    async fn listener_loop(
        config: SubscriberConfig,
        broadcast_tx: broadcast::Sender<MessageCommittedEvent>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        // Survives reconnects even if persisting the cursor failed
        let mut last_id: Option<String> = None;
        loop {
            match Self::run_listener(&config, &broadcast_tx, &mut shutdown_rx, &mut last_id).await
            {
                Ok(()) => {
                    tracing::info!("Subscriber shutting down");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Subscriber error, reconnecting...");
                }
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(config.reconnect_delay_ms))
                .await;
        }
    }

    /// Read the stream until error or shutdown
    async fn run_listener(
        config: &SubscriberConfig,
        broadcast_tx: &broadcast::Sender<MessageCommittedEvent>,
        shutdown_rx: &mut mpsc::Receiver<()>,
        last_id: &mut Option<String>,
    ) -> SubscriberResult<()> {
        let client = Client::open(config.redis_url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let cursor_key = config.cursor_key();

        let mut cursor = match last_id.clone() {
            Some(id) => id,
            None => {
                let stored: Option<String> = conn.get(&cursor_key).await?;
                let newest: StreamRangeReply =
                    conn.xrevrange_count(&config.stream, "+", "-", 1).await?;
                let newest = newest.ids.into_iter().next().map(|entry| entry.id);
                starting_id(stored, newest)
            }
        };

        tracing::info!(stream = %config.stream, cursor = %cursor, "Subscriber connected to Redis");

        let options = StreamReadOptions::default()
            .block(config.block_ms)
            .count(config.batch_size);

        loop {
            let keys = [&config.stream];
            let ids = [&cursor];
            let reply: Option<StreamReadReply> = tokio::select! {
                reply = conn.xread_options(&keys, &ids, &options) => reply?,
                _ = shutdown_rx.recv() => return Ok(()),
            };
            // Nil reply: the block elapsed with nothing new
            let Some(reply) = reply else { continue };

            let (events, next) = read_batch(reply);
            for event in events {
                tracing::trace!(message_id = %event.message_id, "Received event");
                // No receivers just means no router is running yet
                let _ = broadcast_tx.send(event);
            }

            if let Some(next) = next {
                cursor = next;
                *last_id = Some(cursor.clone());
                if let Err(e) = conn.set::<_, _, ()>(&cursor_key, &cursor).await {
                    tracing::warn!(error = %e, "Failed to persist stream cursor");
                }
            }
        }
    }

    /// Get a receiver with its own read position
    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<MessageCommittedEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Shutdown the subscriber
    pub async fn shutdown(&self) -> SubscriberResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SubscriberError::ChannelClosed)
    }
}
