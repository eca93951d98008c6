//! Publish pipeline - half message, local write, commit or rollback
//!
//! Sequence for one send:
//! 1. prepare the half message (not yet visible to the router)
//! 2. run the local write and obtain a [`LocalTxState`]
//! 3. on COMMIT publish the event, on ROLLBACK discard it, on UNKNOWN ask
//!    `check_state` and act on its answer
//!
//! Publication runs under a lease taken in the half message log. The entry
//! is removed only after the event is out, so a publisher that dies between
//! claim and publish leaves it for the reconciler once the lease lapses.
//! Delivery is therefore at least once.

use chrono::{DateTime, Utc};
use relay_core::{
    DomainError, HalfMessage, InboxEntry, LocalTxState, Message, MessageCommittedEvent,
    MessageStatus, NewOfflineEntry, Resolution, Snowflake, DEFAULT_PRIORITY, MENTION_PRIORITY,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::context::ServiceContext;
use super::error::{ServiceError, ServiceResult};
use super::writer::TransactionalWriter;

/// Result of one attempt to make a committed event deliverable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Published; `queued` offline entries were recorded
    Published { subscribers: u32, queued: usize },
    /// Another path holds the lease, or already published or discarded
    AlreadyClaimed,
    /// Publication failed and the lease was released for a later retry
    Deferred,
}

/// Background publication started by a committed send
pub type DeliveryHandle = JoinHandle<DeliveryOutcome>;

pub struct PublishPipeline<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> PublishPipeline<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Persist `message` and, once committed, hand its event to the router.
    ///
    /// Returns after the local write resolves; publication continues on the
    /// returned task. `recipients` is `Some` for write fan-out.
    ///
    /// Messages held for review are written without a half message and are
    /// not published until approved.
    #[instrument(skip(self, message, recipients), fields(message_id = %message.id, seq_id = message.seq_id))]
    pub async fn submit(
        &self,
        message: &Message,
        recipients: Option<Vec<Snowflake>>,
    ) -> ServiceResult<Option<DeliveryHandle>> {
        let inbox = recipients
            .as_deref()
            .map(|ids| InboxEntry::for_recipients(message, ids))
            .unwrap_or_default();
        let writer = TransactionalWriter::new(self.ctx);

        if message.status == MessageStatus::UnderReview {
            let state = writer.execute_local_write(message, inbox).await;
            return match self.resolve(message.id, state).await? {
                Resolution::Commit => {
                    info!("Message stored for review");
                    Ok(None)
                }
                Resolution::Rollback => Err(persistence_failure(message.id)),
            };
        }

        let half = HalfMessage::new(MessageCommittedEvent::new(message, recipients));
        self.ctx.half_log().prepare(&half).await.map_err(|e| {
            error!(error = %e, "Failed to prepare half message");
            ServiceError::Domain(DomainError::PersistenceFailure(e.to_string()))
        })?;

        let state = writer.execute_local_write(message, inbox).await;
        match state {
            LocalTxState::Commit => Ok(Some(self.spawn_delivery(half))),
            LocalTxState::Rollback => {
                self.discard(message.id).await;
                Err(persistence_failure(message.id))
            }
            LocalTxState::Unknown => match self.resolve(message.id, state).await? {
                Resolution::Commit => Ok(Some(self.spawn_delivery(half))),
                // A write cut off mid-commit may still land; the reconciler
                // owns the half message from here
                Resolution::Rollback => Err(persistence_failure(message.id)),
            },
        }
    }

    /// Record the half message of an already committed message, so a
    /// later [`deliver`](Self::deliver) or the reconciler can publish it
    pub async fn prepare_committed(
        &self,
        message: &Message,
        recipients: Option<Vec<Snowflake>>,
    ) -> ServiceResult<HalfMessage> {
        let half = HalfMessage::new(MessageCommittedEvent::new(message, recipients));
        self.ctx.half_log().prepare(&half).await?;
        Ok(half)
    }

    /// Publish a prepared half message in the background
    pub fn publish_prepared(&self, half: HalfMessage) -> DeliveryHandle {
        self.spawn_delivery(half)
    }

    /// Lease the half message and publish its event.
    ///
    /// Failures are logged and absorbed. A failed publish releases the lease
    /// so the reconciler retries; the entry is removed only once the event
    /// and its offline entries are out.
    #[instrument(skip(self, half), fields(message_id = %half.message_id()))]
    pub async fn deliver(&self, half: HalfMessage) -> DeliveryOutcome {
        let message_id = half.message_id();
        match self.ctx.half_log().claim(message_id, self.lease_cutoff()).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Half message already claimed");
                return DeliveryOutcome::AlreadyClaimed;
            }
            Err(e) => {
                warn!(error = %e, "Failed to claim half message");
                return DeliveryOutcome::Deferred;
            }
        }

        let subscribers = match self.ctx.publisher().publish(&half.event).await {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "Publish failed, releasing lease");
                if let Err(e) = self.ctx.half_log().release(message_id).await {
                    // The lease lapses on its own
                    warn!(error = %e, "Failed to release half message lease");
                }
                return DeliveryOutcome::Deferred;
            }
        };

        let queued = self.enqueue_offline(&half.event).await;
        if let Err(e) = self.ctx.half_log().complete(message_id).await {
            warn!(error = %e, "Failed to complete half message, it will be published again");
        }
        info!(subscribers, queued, mode = %half.event.fanout_mode(), "Message published");
        DeliveryOutcome::Published {
            subscribers,
            queued,
        }
    }

    /// Drop the half message of a rolled back write
    pub async fn discard(&self, message_id: Snowflake) -> bool {
        match self.ctx.half_log().complete(message_id).await {
            Ok(removed) => {
                debug!(message_id = %message_id, removed, "Half message discarded");
                removed
            }
            Err(e) => {
                warn!(message_id = %message_id, error = %e, "Failed to discard half message");
                false
            }
        }
    }

    /// Leases taken before this instant have lapsed
    fn lease_cutoff(&self) -> DateTime<Utc> {
        let lease = chrono::Duration::from_std(self.ctx.settings().publish_lease)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        Utc::now() - lease
    }

    fn spawn_delivery(&self, half: HalfMessage) -> DeliveryHandle {
        let ctx = self.ctx.clone();
        tokio::spawn(async move { PublishPipeline::new(&ctx).deliver(half).await })
    }

    async fn resolve(&self, message_id: Snowflake, state: LocalTxState) -> ServiceResult<Resolution> {
        match state.resolved() {
            Some(resolution) => Ok(resolution),
            None => {
                // A commit already sent may still be landing
                tokio::time::sleep(self.ctx.settings().unknown_settle).await;
                TransactionalWriter::new(self.ctx).check_state(message_id).await
            }
        }
    }

    /// Queue write fan-out recipients that are not connected anywhere
    async fn enqueue_offline(&self, event: &MessageCommittedEvent) -> usize {
        let recipients = event.recipients();
        if recipients.is_empty() {
            return 0;
        }

        let offline = match self.ctx.presence().offline_among(recipients).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Presence lookup failed, skipping offline queue");
                return 0;
            }
        };

        let max_retry = self.ctx.settings().offline_max_retry;
        let mut queued = 0;
        for user_id in offline {
            let entry = NewOfflineEntry {
                user_id,
                message_id: event.message_id,
                channel_id: event.channel_id,
                priority: if event.mentions(user_id) {
                    MENTION_PRIORITY
                } else {
                    DEFAULT_PRIORITY
                },
                max_retry,
            };
            match self.ctx.offline_repo().enqueue(&entry).await {
                Ok(_) => queued += 1,
                Err(e) => warn!(user_id = %user_id, error = %e, "Failed to queue offline entry"),
            }
        }
        queued
    }
}

fn persistence_failure(message_id: Snowflake) -> ServiceError {
    ServiceError::Domain(DomainError::PersistenceFailure(format!(
        "local write for message {message_id} did not commit"
    )))
}
