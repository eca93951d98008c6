//! Message, InboxEntry and OfflineQueueEntry entity <-> model mapper

use relay_core::entities::{
    InboxEntry, Message, MessageStatus, MessageType, OfflineQueueEntry, Reaction, RecallRecord,
};
use relay_core::error::DomainError;
use relay_core::value_objects::Snowflake;

use crate::models::{InboxModel, MessageModel, OfflineEntryModel, ReactionModel, RecallModel};

/// Convert MessageModel to Message entity
///
/// `msg_type` is derived from the content variant and not read back.
impl From<MessageModel> for Message {
    fn from(model: MessageModel) -> Self {
        Message {
            id: Snowflake::new(model.id),
            channel_id: Snowflake::new(model.channel_id),
            sender_id: Snowflake::new(model.sender_id),
            seq_id: model.seq_id,
            content: model.content.0,
            media_urls: model.media_urls,
            reply_to_msg_id: model.reply_to_msg_id.map(Snowflake::new),
            forward_from_msg_id: model.forward_from_msg_id.map(Snowflake::new),
            mentioned_user_ids: model
                .mentioned_user_ids
                .into_iter()
                .map(Snowflake::new)
                .collect(),
            mention_all: model.mention_all,
            status: MessageStatus::from(model.status),
            created_at: model.created_at,
        }
    }
}

/// Convert InboxModel to InboxEntry; rows with an unknown msg_type are rejected
impl TryFrom<InboxModel> for InboxEntry {
    type Error = DomainError;

    fn try_from(model: InboxModel) -> Result<Self, Self::Error> {
        Ok(InboxEntry {
            user_id: Snowflake::new(model.user_id),
            message_id: Snowflake::new(model.message_id),
            channel_id: Snowflake::new(model.channel_id),
            sender_id: Snowflake::new(model.sender_id),
            msg_type: MessageType::try_from(model.msg_type)?,
            preview: model.preview,
            is_read: model.is_read,
            is_mentioned: model.is_mentioned,
            created_at: model.created_at,
        })
    }
}

/// Convert OfflineEntryModel to OfflineQueueEntry entity
impl From<OfflineEntryModel> for OfflineQueueEntry {
    fn from(model: OfflineEntryModel) -> Self {
        OfflineQueueEntry {
            id: model.id,
            user_id: Snowflake::new(model.user_id),
            message_id: Snowflake::new(model.message_id),
            channel_id: Snowflake::new(model.channel_id),
            priority: model.priority,
            retry_count: model.retry_count,
            max_retry: model.max_retry,
            next_retry_at: model.next_retry_at,
            delivered: model.delivered,
            delivered_at: model.delivered_at,
            created_at: model.created_at,
        }
    }
}

impl From<ReactionModel> for Reaction {
    fn from(model: ReactionModel) -> Self {
        Reaction {
            message_id: Snowflake::new(model.message_id),
            user_id: Snowflake::new(model.user_id),
            emoji: model.emoji,
            created_at: model.created_at,
        }
    }
}

impl From<RecallModel> for RecallRecord {
    fn from(model: RecallModel) -> Self {
        RecallRecord {
            message_id: Snowflake::new(model.message_id),
            channel_id: Snowflake::new(model.channel_id),
            sender_id: Snowflake::new(model.sender_id),
            recalled_by: Snowflake::new(model.recall_by),
            reason: model.reason,
            original_content: model.original_content.0,
            created_at: model.created_at,
        }
    }
}

/// Message entity values for database insertion
pub struct MessageInsert<'a> {
    pub id: i64,
    pub channel_id: i64,
    pub sender_id: i64,
    pub seq_id: i64,
    pub msg_type: i16,
    pub media_urls: &'a [String],
    pub reply_to_msg_id: Option<i64>,
    pub forward_from_msg_id: Option<i64>,
    pub mentioned_user_ids: Vec<i64>,
    pub mention_all: bool,
    pub status: i16,
}

impl<'a> MessageInsert<'a> {
    pub fn new(message: &'a Message) -> Self {
        Self {
            id: message.id.into_inner(),
            channel_id: message.channel_id.into_inner(),
            sender_id: message.sender_id.into_inner(),
            seq_id: message.seq_id,
            msg_type: message.msg_type().as_i16(),
            media_urls: &message.media_urls,
            reply_to_msg_id: message.reply_to_msg_id.map(Snowflake::into_inner),
            forward_from_msg_id: message.forward_from_msg_id.map(Snowflake::into_inner),
            mentioned_user_ids: ids_to_i64(&message.mentioned_user_ids),
            mention_all: message.mention_all,
            status: message.status.as_i16(),
        }
    }
}

/// Column arrays for a single `UNNEST` batch insert of inbox rows
#[derive(Debug, Default)]
pub struct InboxBatch {
    pub user_ids: Vec<i64>,
    pub previews: Vec<String>,
    pub mentioned: Vec<bool>,
}

impl InboxBatch {
    pub fn new(entries: &[InboxEntry]) -> Self {
        let mut batch = Self {
            user_ids: Vec::with_capacity(entries.len()),
            previews: Vec::with_capacity(entries.len()),
            mentioned: Vec::with_capacity(entries.len()),
        };
        for entry in entries {
            batch.user_ids.push(entry.user_id.into_inner());
            batch.previews.push(entry.preview.clone());
            batch.mentioned.push(entry.is_mentioned);
        }
        batch
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }
}

pub fn ids_to_i64(ids: &[Snowflake]) -> Vec<i64> {
    ids.iter().map(|id| id.into_inner()).collect()
}
