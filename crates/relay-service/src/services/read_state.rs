//! Read state - per-message receipts and per-member unread counters

use relay_core::{DomainError, Message, ReadReceipt, Snowflake};
use tracing::{debug, instrument};

use crate::dto::ReadsResponse;

use super::channel::ChannelService;
use super::context::ServiceContext;
use super::error::ServiceResult;

/// Read state service
pub struct ReadStateService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> ReadStateService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Record that `user_id` read `message_id`.
    ///
    /// Idempotent: the receipt is inserted at most once, and the member's
    /// unread count is reset to 0 with `last_read_seq` set to the message's
    /// seq_id on every call.
    #[instrument(skip(self))]
    pub async fn mark_as_read(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<()> {
        ChannelService::new(self.ctx)
            .require_member(channel_id, user_id)
            .await?;
        let message = self.find_in_channel(channel_id, message_id).await?;

        let receipt = ReadReceipt::new(message_id, channel_id, user_id);
        let created = self
            .ctx
            .receipt_repo()
            .mark_as_read(&receipt, message.seq_id)
            .await?;

        debug!(created, seq_id = message.seq_id, "Read receipt recorded");
        Ok(())
    }

    /// Reader count plus the most recent readers
    #[instrument(skip(self))]
    pub async fn reads(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        user_id: Snowflake,
        limit: i64,
    ) -> ServiceResult<ReadsResponse> {
        ChannelService::new(self.ctx)
            .require_member(channel_id, user_id)
            .await?;
        self.find_in_channel(channel_id, message_id).await?;

        let repo = self.ctx.receipt_repo();
        Ok(ReadsResponse {
            count: repo.count_reads(message_id).await?,
            reader_ids: repo.list_readers(message_id, limit).await?,
        })
    }

    async fn find_in_channel(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> ServiceResult<Message> {
        self.ctx
            .message_repo()
            .find_by_id(message_id)
            .await?
            .filter(|m| m.channel_id == channel_id)
            .ok_or_else(|| DomainError::MessageNotFound(message_id).into())
    }
}
