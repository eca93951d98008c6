//! Request DTOs for API endpoints
//!
//! All request DTOs implement `Deserialize` and `Validate` for input validation.
//! Field names are camelCase on the wire.

use relay_core::{ChannelType, MemberRole, MessageContent, Snowflake};
use serde::Deserialize;
use validator::{Validate, ValidationError};

/// Upper bound for page sizes on every list endpoint
pub const MAX_PAGE_LIMIT: i64 = 100;

// ============================================================================
// Message Requests
// ============================================================================

/// Submit (ingest) a message into a channel. The sender is the caller.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMessageRequest {
    /// Type-tagged body, validated by `MessageContent::validate`
    pub content: MessageContent,

    #[serde(default)]
    #[validate(
        length(max = 10, message = "At most 10 media URLs per message"),
        custom(function = "validate_media_urls")
    )]
    pub media_urls: Vec<String>,

    pub reply_to_msg_id: Option<Snowflake>,

    pub forward_from_msg_id: Option<Snowflake>,

    #[serde(default)]
    #[validate(length(max = 100, message = "At most 100 mentions per message"))]
    pub mentioned_user_ids: Vec<Snowflake>,

    #[serde(default)]
    pub mention_all: bool,
}

fn validate_media_urls(urls: &Vec<String>) -> Result<(), ValidationError> {
    let all_http = urls
        .iter()
        .all(|u| (u.starts_with("https://") || u.starts_with("http://")) && u.len() <= 2048);
    if all_http {
        Ok(())
    } else {
        let mut err = ValidationError::new("media_url");
        err.message = Some("Media URLs must be http(s) and at most 2048 characters".into());
        Err(err)
    }
}

/// Resolve a message held for review
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReviewDecisionRequest {
    pub approve: bool,
}

/// Optional body of a recall
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RecallRequest {
    #[validate(length(max = 500, message = "Recall reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

/// `?emoji=` of the reaction endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionParams {
    pub emoji: String,
}

// ============================================================================
// Channel Requests
// ============================================================================

/// Create channel request; the caller becomes its owner
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelRequest {
    #[serde(default)]
    pub channel_type: ChannelType,

    #[validate(length(min = 1, max = 100, message = "Channel name must be 1-100 characters"))]
    pub name: Option<String>,

    #[serde(default = "default_max_members")]
    #[validate(range(min = 2, max = 100_000, message = "maxMembers must be 2-100000"))]
    pub max_members: i32,
}

fn default_max_members() -> i32 {
    500
}

/// Grant or revoke ADMIN (body of PUT .../admins/:user_id)
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

/// Add member request (body of PUT .../members/:user_id)
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct AddMemberRequest {
    #[serde(default)]
    pub role: MemberRole,
}

// ============================================================================
// Query parameters
// ============================================================================

/// Sync cursor: messages with `seqId > cursor`
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct SyncParams {
    #[serde(default)]
    pub cursor: i64,
    pub limit: Option<i64>,
}

impl SyncParams {
    /// Page size clamped to 1..=100, default 50
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, MAX_PAGE_LIMIT)
    }
}

/// Plain `?limit=` parameter
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

impl LimitParams {
    pub fn limit_or(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, MAX_PAGE_LIMIT)
    }
}

/// Mentions page: messages with `id < before`, newest first
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct MentionParams {
    pub before: Option<Snowflake>,
    pub limit: Option<i64>,
}

impl MentionParams {
    /// Page size clamped to 1..=100, default 20
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, MAX_PAGE_LIMIT)
    }
}
