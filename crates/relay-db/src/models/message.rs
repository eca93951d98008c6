//! Timeline and inbox database models

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;

use relay_core::entities::MessageContent;

/// Database model for messages table
#[derive(Debug, Clone, FromRow)]
pub struct MessageModel {
    pub id: i64,
    pub channel_id: i64,
    pub sender_id: i64,
    pub seq_id: i64,
    pub msg_type: i16,
    pub content: Json<MessageContent>,
    pub media_urls: Vec<String>,
    pub reply_to_msg_id: Option<i64>,
    pub forward_from_msg_id: Option<i64>,
    pub mentioned_user_ids: Vec<i64>,
    pub mention_all: bool,
    pub status: i16,
    pub created_at: DateTime<Utc>,
}

/// Database model for message_inbox table
#[derive(Debug, Clone, FromRow)]
pub struct InboxModel {
    pub user_id: i64,
    pub message_id: i64,
    pub channel_id: i64,
    pub sender_id: i64,
    pub msg_type: i16,
    pub preview: String,
    pub is_read: bool,
    pub is_mentioned: bool,
    pub created_at: DateTime<Utc>,
}

/// Database model for message_reactions table
#[derive(Debug, Clone, FromRow)]
pub struct ReactionModel {
    pub message_id: i64,
    pub user_id: i64,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

/// Database model for message_recalls table
#[derive(Debug, Clone, FromRow)]
pub struct RecallModel {
    pub message_id: i64,
    pub channel_id: i64,
    pub sender_id: i64,
    pub recall_by: i64,
    pub reason: Option<String>,
    pub original_content: Json<MessageContent>,
    pub created_at: DateTime<Utc>,
}
