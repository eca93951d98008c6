//! Message committed event and its half-message envelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{Message, MessageContent, MessageType};
use crate::value_objects::{FanoutMode, Snowflake};

/// Event published once a message is durably in the timeline.
///
/// `receiver_ids` is present only for write fan-out; read fan-out events
/// carry no recipients and members pull through sync instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCommittedEvent {
    pub message_id: Snowflake,
    pub channel_id: Snowflake,
    pub sender_id: Snowflake,
    pub seq_id: i64,
    pub msg_type: MessageType,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_ids: Option<Vec<Snowflake>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentioned_user_ids: Vec<Snowflake>,
    #[serde(default)]
    pub mention_all: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageCommittedEvent {
    /// Build the event for `message`; the sender is never a receiver
    pub fn new(message: &Message, receivers: Option<Vec<Snowflake>>) -> Self {
        let receiver_ids = receivers.map(|ids| {
            ids.into_iter()
                .filter(|&id| id != message.sender_id)
                .collect()
        });
        Self {
            message_id: message.id,
            channel_id: message.channel_id,
            sender_id: message.sender_id,
            seq_id: message.seq_id,
            msg_type: message.msg_type(),
            content: message.content.clone(),
            receiver_ids,
            mentioned_user_ids: message.mentioned_user_ids.clone(),
            mention_all: message.mention_all,
            created_at: message.created_at,
        }
    }

    pub fn fanout_mode(&self) -> FanoutMode {
        if self.receiver_ids.is_some() {
            FanoutMode::WriteFanout
        } else {
            FanoutMode::ReadFanout
        }
    }

    /// Explicit recipients; empty for read fan-out
    pub fn recipients(&self) -> &[Snowflake] {
        self.receiver_ids.as_deref().unwrap_or_default()
    }

    #[inline]
    pub fn mentions(&self, user_id: Snowflake) -> bool {
        self.mention_all || self.mentioned_user_ids.contains(&user_id)
    }
}

/// A prepared but not yet visible event.
///
/// Recorded before the local write. Only the holder of its publishing lease
/// may publish the event, and the entry is removed once that succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalfMessage {
    pub event: MessageCommittedEvent,
    pub prepared_at: DateTime<Utc>,
}

impl HalfMessage {
    pub fn new(event: MessageCommittedEvent) -> Self {
        Self {
            event,
            prepared_at: Utc::now(),
        }
    }

    #[inline]
    pub fn message_id(&self) -> Snowflake {
        self.event.message_id
    }

    /// Older than `cutoff`, meaning its writer is presumed gone
    #[inline]
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.prepared_at < cutoff
    }
}
