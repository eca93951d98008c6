//! Message entity - a row of a channel's timeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::content::{MessageContent, MessageType};
use crate::error::DomainError;
use crate::value_objects::Snowflake;

/// Message moderation / lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum MessageStatus {
    #[default]
    Normal = 1,
    Recalled = 2,
    Deleted = 3,
    UnderReview = 4,
    Rejected = 5,
}

impl MessageStatus {
    #[inline]
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    /// Allowed transitions:
    /// NORMAL -> RECALLED | DELETED | UNDER_REVIEW,
    /// UNDER_REVIEW -> NORMAL | REJECTED.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Normal, Self::Recalled | Self::Deleted | Self::UnderReview)
                | (Self::UnderReview, Self::Normal | Self::Rejected)
        )
    }

    pub fn transition_to(self, next: Self) -> Result<Self, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidStatusTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl From<i16> for MessageStatus {
    fn from(value: i16) -> Self {
        match value {
            2 => Self::Recalled,
            3 => Self::Deleted,
            4 => Self::UnderReview,
            5 => Self::Rejected,
            _ => Self::Normal,
        }
    }
}

/// Timeline message. Append-only; only `status` changes after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub sender_id: Snowflake,
    /// Unique and strictly increasing within `channel_id`
    pub seq_id: i64,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_msg_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_from_msg_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentioned_user_ids: Vec<Snowflake>,
    #[serde(default)]
    pub mention_all: bool,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: Snowflake,
        channel_id: Snowflake,
        sender_id: Snowflake,
        seq_id: i64,
        content: MessageContent,
    ) -> Self {
        Self {
            id,
            channel_id,
            sender_id,
            seq_id,
            content,
            media_urls: Vec::new(),
            reply_to_msg_id: None,
            forward_from_msg_id: None,
            mentioned_user_ids: Vec::new(),
            mention_all: false,
            status: MessageStatus::Normal,
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn msg_type(&self) -> MessageType {
        self.content.message_type()
    }

    /// Whether `user_id` is mentioned, directly or through `mention_all`
    #[inline]
    pub fn mentions(&self, user_id: Snowflake) -> bool {
        self.mention_all || self.mentioned_user_ids.contains(&user_id)
    }
}
