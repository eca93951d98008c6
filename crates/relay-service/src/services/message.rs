//! Message service
//!
//! Ingestion, sync, recall, review resolution, mentions, and the per-user
//! inbox.

use std::collections::HashMap;

use relay_core::entities::MAX_RECALL_REASON_LENGTH;
use relay_core::{
    DomainError, InboxEntry, Message, MessageContent, MessageStatus, ModerationVerdict,
    RecallRecord, Snowflake, SyncQuery,
};
use tracing::{info, instrument};
use validator::Validate;

use crate::dto::{
    InboxEntryResponse, MentionParams, MessageResponse, RecallRecordResponse,
    SubmitMessageRequest, SubmitMessageResponse, SyncParams, SyncResponse,
};

use super::channel::ChannelService;
use super::context::ServiceContext;
use super::error::{ServiceError, ServiceResult};
use super::fanout::FanoutDecider;
use super::publish::{DeliveryHandle, PublishPipeline};
use super::sequencer::SequencerService;

const RECALLED_TEXT: &str = "This message was recalled";

/// Message service
pub struct MessageService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> MessageService<'a> {
    /// Create a new MessageService
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Ingest a message. Returns once the local write has committed;
    /// delivery continues in the background.
    pub async fn submit(
        &self,
        channel_id: Snowflake,
        sender_id: Snowflake,
        request: SubmitMessageRequest,
    ) -> ServiceResult<SubmitMessageResponse> {
        let (response, _delivery) = self.submit_tracked(channel_id, sender_id, request).await?;
        Ok(response)
    }

    /// Same as [`submit`](Self::submit), also handing back the delivery task
    /// (`None` for messages held for review)
    #[instrument(skip(self, request))]
    pub async fn submit_tracked(
        &self,
        channel_id: Snowflake,
        sender_id: Snowflake,
        request: SubmitMessageRequest,
    ) -> ServiceResult<(SubmitMessageResponse, Option<DeliveryHandle>)> {
        request.validate()?;
        request.content.validate()?;

        let channels = ChannelService::new(self.ctx);
        let channel = channels.find_channel(channel_id).await?;
        if !channel.is_active() {
            return Err(DomainError::ChannelInactive.into());
        }
        channels.require_sender(channel_id, sender_id).await?;

        if let Some(reply_id) = request.reply_to_msg_id {
            let in_channel = self
                .ctx
                .message_repo()
                .find_by_id(reply_id)
                .await?
                .is_some_and(|m| m.channel_id == channel_id);
            if !in_channel {
                return Err(ServiceError::validation(
                    "replyToMsgId must reference a message in this channel",
                ));
            }
        }
        if let Some(forward_id) = request.forward_from_msg_id {
            if !self.ctx.message_repo().exists(forward_id).await? {
                return Err(ServiceError::validation(
                    "forwardFromMsgId references an unknown message",
                ));
            }
        }

        let status = match self.ctx.moderation().review(&request.content).await {
            ModerationVerdict::Approve => MessageStatus::Normal,
            ModerationVerdict::Review => MessageStatus::UnderReview,
        };

        let decision = FanoutDecider::new(self.ctx).decide(channel_id).await?;
        let seq_id = SequencerService::new(self.ctx).next_seq(channel_id).await?;

        let mut message = Message::new(
            self.ctx.generate_id(),
            channel_id,
            sender_id,
            seq_id,
            request.content,
        );
        message.media_urls = request.media_urls;
        message.reply_to_msg_id = request.reply_to_msg_id;
        message.forward_from_msg_id = request.forward_from_msg_id;
        message.mentioned_user_ids = dedup(request.mentioned_user_ids);
        message.mention_all = request.mention_all;
        message.status = status;

        let delivery = PublishPipeline::new(self.ctx)
            .submit(&message, decision.recipients)
            .await?;

        info!(
            message_id = %message.id,
            seq_id,
            fanout_mode = %decision.mode,
            status = ?status,
            "Message committed"
        );

        Ok((
            SubmitMessageResponse {
                message_id: message.id,
                seq_id,
                fanout_mode: decision.mode,
            },
            delivery,
        ))
    }

    /// Messages with `seq_id > cursor`, ascending.
    ///
    /// Deleted messages are skipped, as are messages under review or
    /// rejected unless the caller sent them. Recalled messages keep their
    /// slot with the content withdrawn. `next_cursor` advances past every
    /// scanned row, hidden ones included.
    #[instrument(skip(self))]
    pub async fn sync(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
        params: SyncParams,
    ) -> ServiceResult<SyncResponse> {
        let channels = ChannelService::new(self.ctx);
        channels.find_channel(channel_id).await?;
        channels.require_member(channel_id, user_id).await?;

        let limit = params.limit();
        let cursor = params.cursor.max(0);
        let rows = self
            .ctx
            .message_repo()
            .sync(channel_id, SyncQuery { cursor, limit })
            .await?;

        let has_more = rows.len() as i64 >= limit;
        let next_cursor = rows.last().map_or(cursor, |m| m.seq_id);
        let messages = rows
            .into_iter()
            .filter(|m| visible_to(m, user_id))
            .map(|m| MessageResponse::from(redact(m)))
            .collect();

        Ok(SyncResponse {
            messages,
            next_cursor,
            has_more,
        })
    }

    /// Get one message
    #[instrument(skip(self))]
    pub async fn get_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<MessageResponse> {
        ChannelService::new(self.ctx)
            .require_member(channel_id, user_id)
            .await?;

        let message = self
            .find_in_channel(channel_id, message_id)
            .await?
            .filter(|m| visible_to(m, user_id))
            .ok_or(DomainError::MessageNotFound(message_id))?;

        Ok(MessageResponse::from(redact(message)))
    }

    /// Recall a message: NORMAL to RECALLED, by its sender or a channel
    /// ADMIN/OWNER. The audit record is written with the status change.
    #[instrument(skip(self, reason))]
    pub async fn recall(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        user_id: Snowflake,
        reason: Option<String>,
    ) -> ServiceResult<()> {
        if reason
            .as_deref()
            .is_some_and(|r| r.chars().count() > MAX_RECALL_REASON_LENGTH)
        {
            return Err(ServiceError::validation(format!(
                "Recall reason must be at most {MAX_RECALL_REASON_LENGTH} characters"
            )));
        }

        let member = ChannelService::new(self.ctx)
            .require_member(channel_id, user_id)
            .await?;
        let message = self
            .find_in_channel(channel_id, message_id)
            .await?
            .ok_or(DomainError::MessageNotFound(message_id))?;

        if message.sender_id != user_id && !member.role.can_moderate() {
            return Err(DomainError::NotMessageSender.into());
        }

        message.status.transition_to(MessageStatus::Recalled)?;
        let record = RecallRecord::new(&message, user_id, reason);
        if !self.ctx.message_repo().recall(&record).await? {
            return Err(DomainError::InvalidStatusTransition {
                from: message.status,
                to: MessageStatus::Recalled,
            }
            .into());
        }

        info!(
            message_id = %message_id,
            by = %user_id,
            by_moderator = record.by_moderator(),
            "Message recalled"
        );
        Ok(())
    }

    /// Audit record of a recalled message, for its sender and moderators
    #[instrument(skip(self))]
    pub async fn recall_record(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<RecallRecordResponse> {
        let member = ChannelService::new(self.ctx)
            .require_member(channel_id, user_id)
            .await?;
        let record = self
            .ctx
            .message_repo()
            .find_recall(message_id)
            .await?
            .filter(|r| r.channel_id == channel_id)
            .ok_or_else(|| ServiceError::not_found("RecallRecord", message_id.to_string()))?;

        if record.sender_id != user_id && !member.role.can_moderate() {
            return Err(ServiceError::permission_denied("VIEW_RECALLS"));
        }
        Ok(RecallRecordResponse::from(record))
    }

    /// Messages mentioning the caller, newest first, limited to channels the
    /// caller is still a member of
    #[instrument(skip(self))]
    pub async fn mentions(
        &self,
        user_id: Snowflake,
        params: MentionParams,
    ) -> ServiceResult<Vec<MessageResponse>> {
        let rows = self
            .ctx
            .message_repo()
            .mentioning(user_id, params.before, params.limit())
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let channels: std::collections::HashSet<Snowflake> = self
            .ctx
            .membership()
            .channels_of(user_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        Ok(rows
            .into_iter()
            .filter(|m| channels.contains(&m.channel_id))
            .map(MessageResponse::from)
            .collect())
    }

    /// Approve (UNDER_REVIEW to NORMAL, then publish) or reject a held
    /// message. Reviewers are channel ADMINs and OWNERs.
    #[instrument(skip(self))]
    pub async fn resolve_review(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        reviewer_id: Snowflake,
        approve: bool,
    ) -> ServiceResult<Option<DeliveryHandle>> {
        let reviewer = ChannelService::new(self.ctx)
            .require_member(channel_id, reviewer_id)
            .await?;
        if !reviewer.role.can_moderate() {
            return Err(ServiceError::permission_denied("REVIEW_MESSAGES"));
        }

        let message = self
            .find_in_channel(channel_id, message_id)
            .await?
            .ok_or(DomainError::MessageNotFound(message_id))?;

        if !approve {
            self.transition(&message, MessageStatus::Rejected).await?;
            // Left behind by an approval that failed midway
            PublishPipeline::new(self.ctx).discard(message_id).await;
            info!(message_id = %message_id, approve, "Review resolved");
            return Ok(None);
        }

        // Inbox rows exist only if the original send used write fan-out
        let inbox = self.ctx.inbox_repo().find_by_message(message_id).await?;
        let recipients = if inbox.is_empty() {
            None
        } else {
            Some(inbox.into_iter().map(|e| e.user_id).collect())
        };

        message.status.transition_to(MessageStatus::Normal)?;

        // The event is recorded before the status flips, so an approval that
        // dies after the flip is still published by the reconciler
        let pipeline = PublishPipeline::new(self.ctx);
        let mut approved = message.clone();
        approved.status = MessageStatus::Normal;
        let half = pipeline.prepare_committed(&approved, recipients).await?;

        // A lost transition leaves the half message to the reconciler, which
        // publishes it only if some approval did land
        self.transition(&message, MessageStatus::Normal).await?;
        info!(message_id = %message_id, approve, "Review resolved");

        Ok(Some(pipeline.publish_prepared(half)))
    }

    /// Newest-first inbox of the caller, hiding messages that are no longer
    /// visible
    #[instrument(skip(self))]
    pub async fn inbox(
        &self,
        user_id: Snowflake,
        limit: i64,
    ) -> ServiceResult<Vec<InboxEntryResponse>> {
        let entries = self.ctx.inbox_repo().list_for_user(user_id, limit).await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Snowflake> = entries.iter().map(|e| e.message_id).collect();
        let statuses: HashMap<Snowflake, MessageStatus> = self
            .ctx
            .message_repo()
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|m| (m.id, m.status))
            .collect();

        Ok(entries
            .into_iter()
            .filter_map(|entry| match statuses.get(&entry.message_id) {
                Some(MessageStatus::Normal) => Some(entry),
                Some(MessageStatus::Recalled) => Some(InboxEntry {
                    preview: "[recalled]".to_string(),
                    ..entry
                }),
                _ => None,
            })
            .map(InboxEntryResponse::from)
            .collect())
    }

    async fn find_in_channel(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> ServiceResult<Option<Message>> {
        Ok(self
            .ctx
            .message_repo()
            .find_by_id(message_id)
            .await?
            .filter(|m| m.channel_id == channel_id))
    }

    /// Validate and compare-and-set a status change
    async fn transition(&self, message: &Message, to: MessageStatus) -> ServiceResult<()> {
        message.status.transition_to(to)?;
        let changed = self
            .ctx
            .message_repo()
            .update_status(message.id, message.status, to)
            .await?;
        if !changed {
            // Lost a race with another status change
            return Err(DomainError::InvalidStatusTransition {
                from: message.status,
                to,
            }
            .into());
        }
        Ok(())
    }
}

fn visible_to(message: &Message, user_id: Snowflake) -> bool {
    match message.status {
        MessageStatus::Normal | MessageStatus::Recalled => true,
        MessageStatus::UnderReview | MessageStatus::Rejected => message.sender_id == user_id,
        MessageStatus::Deleted => false,
    }
}

fn redact(mut message: Message) -> Message {
    if message.status == MessageStatus::Recalled {
        message.content = MessageContent::System {
            text: RECALLED_TEXT.to_string(),
        };
        message.media_urls.clear();
    }
    message
}

fn dedup(mut ids: Vec<Snowflake>) -> Vec<Snowflake> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.retain(|id| seen.insert(*id));
    ids
}
