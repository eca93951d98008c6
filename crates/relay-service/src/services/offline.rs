//! Offline queue - store-and-forward for recipients that were not connected

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use relay_core::{Message, MessageStatus, OfflineQueueEntry, Snowflake};
use tracing::{debug, info, instrument, warn};

use super::context::ServiceContext;
use super::error::ServiceResult;

/// Where drained entries are pushed (a live session of the user)
#[async_trait]
pub trait OfflineSink: Send + Sync {
    /// Push one queued message; false if the push did not go through
    async fn push(&self, entry: &OfflineQueueEntry, message: &Message) -> bool;
}

/// Counts from one drain of a user's queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Sent to the sink; delivered once the client acknowledges them
    pub pushed: usize,
    pub failed: usize,
    /// Entries whose message is no longer visible; marked delivered unsent
    pub skipped: usize,
}

pub struct OfflineQueueService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> OfflineQueueService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Push every due entry of `user_id` through `sink`, highest priority
    /// first. A pushed entry stays pending until the client acknowledges it;
    /// if no ack arrives within the ack timeout it becomes due again. Failed
    /// pushes are rescheduled with backoff. Both count as an attempt, and
    /// once retries are exhausted the entry stays in the table without a
    /// next attempt.
    #[instrument(skip(self, sink))]
    pub async fn drain(&self, user_id: Snowflake, sink: &dyn OfflineSink) -> ServiceResult<DrainReport> {
        let settings = self.ctx.settings();
        let now = Utc::now();
        let entries = self
            .ctx
            .offline_repo()
            .pending_for_user(user_id, now, settings.drain_batch_size)
            .await?;
        if entries.is_empty() {
            return Ok(DrainReport::default());
        }

        let ids: Vec<Snowflake> = entries.iter().map(|e| e.message_id).collect();
        let messages: HashMap<Snowflake, Message> = self
            .ctx
            .message_repo()
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let ack_timeout = chrono::Duration::from_std(settings.ack_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));

        let mut report = DrainReport::default();
        for entry in entries {
            let message = match messages.get(&entry.message_id) {
                Some(m) if m.status == MessageStatus::Normal => m,
                _ => {
                    self.ctx
                        .offline_repo()
                        .mark_delivered(entry.id, entry.user_id)
                        .await?;
                    report.skipped += 1;
                    continue;
                }
            };

            let pushed = sink.push(&entry, message).await;
            let attempted_at = Utc::now();
            let mut next = settings.retry_policy.next_retry_at(
                attempted_at,
                entry.retry_count + 1,
                entry.max_retry,
            );
            if pushed {
                next = next.map(|at| at.max(attempted_at + ack_timeout));
                report.pushed += 1;
            } else {
                report.failed += 1;
            }
            if next.is_none() {
                warn!(entry_id = entry.id, "Offline entry exhausted its retries");
            }
            self.ctx.offline_repo().record_attempt(entry.id, next).await?;
        }

        if report.pushed > 0 || report.failed > 0 {
            info!(
                pushed = report.pushed,
                failed = report.failed,
                skipped = report.skipped,
                "Offline queue drained"
            );
        } else {
            debug!(skipped = report.skipped, "Offline queue had nothing to push");
        }
        Ok(report)
    }

    /// Client acknowledgement of a pushed entry. False when the entry is
    /// unknown, belongs to another user, or was already acknowledged.
    #[instrument(skip(self))]
    pub async fn acknowledge(&self, user_id: Snowflake, entry_id: i64) -> ServiceResult<bool> {
        let acked = self
            .ctx
            .offline_repo()
            .mark_delivered(entry_id, user_id)
            .await?;
        if !acked {
            debug!(entry_id, "Ack for an entry that is not pending");
        }
        Ok(acked)
    }

    /// Every queued entry of a user, delivered or not
    pub async fn entries_for_user(&self, user_id: Snowflake) -> ServiceResult<Vec<OfflineQueueEntry>> {
        Ok(self.ctx.offline_repo().find_by_user(user_id).await?)
    }
}
