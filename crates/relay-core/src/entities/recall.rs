//! Recall audit record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::content::MessageContent;
use super::message::Message;
use crate::value_objects::Snowflake;

/// Longest accepted recall reason, in characters
pub const MAX_RECALL_REASON_LENGTH: usize = 500;

/// Who recalled a message, why, and what it said. Written in the same
/// transaction as the NORMAL to RECALLED status change; one per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallRecord {
    pub message_id: Snowflake,
    pub channel_id: Snowflake,
    /// Original sender
    pub sender_id: Snowflake,
    pub recalled_by: Snowflake,
    pub reason: Option<String>,
    /// Content as it was before the recall
    pub original_content: MessageContent,
    pub created_at: DateTime<Utc>,
}

impl RecallRecord {
    pub fn new(message: &Message, recalled_by: Snowflake, reason: Option<String>) -> Self {
        Self {
            message_id: message.id,
            channel_id: message.channel_id,
            sender_id: message.sender_id,
            recalled_by,
            reason: reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            original_content: message.content.clone(),
            created_at: Utc::now(),
        }
    }

    /// Recalled by someone other than the sender
    #[inline]
    pub fn by_moderator(&self) -> bool {
        self.recalled_by != self.sender_id
    }
}
