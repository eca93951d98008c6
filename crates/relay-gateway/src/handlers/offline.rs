//! Offline replay to live sessions

use crate::connection::{Connection, SessionRegistry};
use crate::protocol::{PushCommand, PushMessage, PushPacket};
use async_trait::async_trait;
use relay_core::{Message, OfflineQueueEntry, Snowflake};
use relay_service::{DrainReport, OfflineQueueService, OfflineSink, ServiceContext, ServiceResult};
use std::sync::Arc;
use std::time::Duration;

/// How long a replay right after IDENTIFY waits for room in the queue
pub const REPLAY_PUSH_WAIT: Duration = Duration::from_millis(500);

/// Pushes queued messages to one session as OFFLINE_PUSH frames
pub struct SessionSink {
    connection: Arc<Connection>,
    /// `None` never waits: a full queue fails the push at once
    wait: Option<Duration>,
}

impl SessionSink {
    /// Sink that waits up to [`REPLAY_PUSH_WAIT`] for queue room
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            wait: Some(REPLAY_PUSH_WAIT),
        }
    }

    /// Sink for the periodic sweep, which must not stall on a slow reader
    pub fn non_blocking(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            wait: None,
        }
    }
}

#[async_trait]
impl OfflineSink for SessionSink {
    async fn push(&self, entry: &OfflineQueueEntry, message: &Message) -> bool {
        let packet = PushPacket::new(
            PushCommand::OfflinePush,
            PushMessage::from_message(message).with_entry_id(entry.id),
        );
        match self.wait {
            None => self.connection.try_push(packet).is_ok(),
            Some(wait) => matches!(
                tokio::time::timeout(wait, self.connection.push(packet)).await,
                Ok(Ok(()))
            ),
        }
    }
}

/// Drain the due entries of `user_id` into `connection`
pub async fn drain_to(
    ctx: &ServiceContext,
    user_id: Snowflake,
    connection: Arc<Connection>,
) -> ServiceResult<DrainReport> {
    OfflineQueueService::new(ctx)
        .drain(user_id, &SessionSink::new(connection))
        .await
}

/// Drain every user with a session on this node; returns pushed entries.
/// A session whose queue is full gets failed attempts instead of holding
/// up the others.
pub async fn sweep(ctx: &ServiceContext, registry: &SessionRegistry) -> usize {
    let service = OfflineQueueService::new(ctx);
    let mut pushed = 0;
    for user_id in registry.local_users() {
        let Some(connection) = registry.lookup(user_id) else {
            continue;
        };
        match service
            .drain(user_id, &SessionSink::non_blocking(connection))
            .await
        {
            Ok(report) => pushed += report.pushed,
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Offline sweep failed for user"),
        }
    }
    pushed
}
