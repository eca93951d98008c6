//! Response DTOs for API endpoints
//!
//! All response DTOs implement `Serialize` for JSON output. Field names are
//! camelCase; Snowflake IDs serialize as strings.

use chrono::{DateTime, Utc};
use relay_core::{
    Channel, ChannelMember, ChannelStatus, ChannelType, FanoutMode, InboxEntry, MemberRole,
    Message, MessageContent, MessageStatus, MessageType, Reaction, RecallRecord, Snowflake,
};
use serde::Serialize;

// ============================================================================
// Message Responses
// ============================================================================

/// Result of a committed submit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMessageResponse {
    pub message_id: Snowflake,
    pub seq_id: i64,
    pub fanout_mode: FanoutMode,
}

/// Timeline message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub sender_id: Snowflake,
    pub seq_id: i64,
    pub msg_type: MessageType,
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_msg_id: Option<Snowflake>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_from_msg_id: Option<Snowflake>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mentioned_user_ids: Vec<Snowflake>,
    pub mention_all: bool,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            msg_type: message.msg_type(),
            id: message.id,
            channel_id: message.channel_id,
            sender_id: message.sender_id,
            seq_id: message.seq_id,
            content: message.content,
            media_urls: message.media_urls,
            reply_to_msg_id: message.reply_to_msg_id,
            forward_from_msg_id: message.forward_from_msg_id,
            mentioned_user_ids: message.mentioned_user_ids,
            mention_all: message.mention_all,
            status: message.status,
            created_at: message.created_at,
        }
    }
}

/// One page of sync
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub messages: Vec<MessageResponse>,
    /// Pass back as `cursor` to continue; unchanged when nothing was returned
    pub next_cursor: i64,
    pub has_more: bool,
}

/// Read aggregates of a message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadsResponse {
    pub count: i64,
    pub reader_ids: Vec<Snowflake>,
}

/// Inbox row of the caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntryResponse {
    pub message_id: Snowflake,
    pub channel_id: Snowflake,
    pub sender_id: Snowflake,
    pub msg_type: MessageType,
    pub preview: String,
    pub is_read: bool,
    pub is_mentioned: bool,
    pub created_at: DateTime<Utc>,
}

impl From<InboxEntry> for InboxEntryResponse {
    fn from(entry: InboxEntry) -> Self {
        Self {
            message_id: entry.message_id,
            channel_id: entry.channel_id,
            sender_id: entry.sender_id,
            msg_type: entry.msg_type,
            preview: entry.preview,
            is_read: entry.is_read,
            is_mentioned: entry.is_mentioned,
            created_at: entry.created_at,
        }
    }
}

/// One user's reaction to a message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionResponse {
    pub message_id: Snowflake,
    pub user_id: Snowflake,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

impl From<Reaction> for ReactionResponse {
    fn from(reaction: Reaction) -> Self {
        Self {
            message_id: reaction.message_id,
            user_id: reaction.user_id,
            emoji: reaction.emoji,
            created_at: reaction.created_at,
        }
    }
}

/// Recall audit record, original content included
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallRecordResponse {
    pub message_id: Snowflake,
    pub channel_id: Snowflake,
    pub sender_id: Snowflake,
    pub recalled_by: Snowflake,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub original_content: MessageContent,
    pub recalled_at: DateTime<Utc>,
}

impl From<RecallRecord> for RecallRecordResponse {
    fn from(record: RecallRecord) -> Self {
        Self {
            message_id: record.message_id,
            channel_id: record.channel_id,
            sender_id: record.sender_id,
            recalled_by: record.recalled_by,
            reason: record.reason,
            original_content: record.original_content,
            recalled_at: record.created_at,
        }
    }
}

// ============================================================================
// Channel Responses
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResponse {
    pub id: Snowflake,
    pub channel_type: ChannelType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub owner_id: Snowflake,
    pub member_count: i32,
    pub max_members: i32,
    pub status: ChannelStatus,
    pub created_at: DateTime<Utc>,
    /// The other member, on private channels listed for a user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<Snowflake>,
}

impl ChannelResponse {
    pub fn with_peer(mut self, peer_id: Snowflake) -> Self {
        self.peer_id = Some(peer_id);
        self
    }
}

impl From<&Channel> for ChannelResponse {
    fn from(channel: &Channel) -> Self {
        Self {
            id: channel.id,
            channel_type: channel.channel_type,
            name: channel.name.clone(),
            owner_id: channel.owner_id,
            member_count: channel.member_count,
            max_members: channel.max_members,
            status: channel.status,
            created_at: channel.created_at,
            peer_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub channel_id: Snowflake,
    pub user_id: Snowflake,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

impl From<&ChannelMember> for MemberResponse {
    fn from(member: &ChannelMember) -> Self {
        Self {
            channel_id: member.channel_id,
            user_id: member.user_id,
            role: member.role,
            joined_at: member.joined_at,
        }
    }
}

// ============================================================================
// Health Check Responses
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Readiness check response
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub checks: HealthChecks,
}

/// Health check status for each backing store
#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub database: String,
    pub redis: String,
}

impl ReadinessResponse {
    pub fn ready(database_healthy: bool, redis_healthy: bool) -> Self {
        let all_healthy = database_healthy && redis_healthy;
        Self {
            status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
            timestamp: Utc::now(),
            checks: HealthChecks {
                database: if database_healthy { "healthy" } else { "unhealthy" }.to_string(),
                redis: if redis_healthy { "healthy" } else { "unhealthy" }.to_string(),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}
