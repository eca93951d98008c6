//! Inbox entry - per-recipient projection written under write fan-out

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::content::MessageType;
use super::message::Message;
use crate::value_objects::Snowflake;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub user_id: Snowflake,
    pub message_id: Snowflake,
    pub channel_id: Snowflake,
    pub sender_id: Snowflake,
    pub msg_type: MessageType,
    pub preview: String,
    pub is_read: bool,
    pub is_mentioned: bool,
    pub created_at: DateTime<Utc>,
}

impl InboxEntry {
    pub fn for_recipient(message: &Message, user_id: Snowflake) -> Self {
        Self {
            user_id,
            message_id: message.id,
            channel_id: message.channel_id,
            sender_id: message.sender_id,
            msg_type: message.msg_type(),
            preview: message.content.preview(),
            is_read: false,
            is_mentioned: message.mentions(user_id),
            created_at: message.created_at,
        }
    }

    /// One entry per recipient, never one for the sender
    pub fn for_recipients(message: &Message, recipients: &[Snowflake]) -> Vec<Self> {
        recipients
            .iter()
            .copied()
            .filter(|&user_id| user_id != message.sender_id)
            .map(|user_id| Self::for_recipient(message, user_id))
            .collect()
    }
}
