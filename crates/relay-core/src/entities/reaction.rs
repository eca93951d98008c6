//! Emoji reaction on a message

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::Snowflake;

/// Longest accepted emoji, in characters (covers ZWJ sequences and
/// `:short_code:` names)
pub const MAX_EMOJI_LENGTH: usize = 32;

/// One user's reaction, unique per (message_id, user_id, emoji)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: Snowflake,
    pub user_id: Snowflake,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

impl Reaction {
    /// Build a reaction with a trimmed emoji, rejecting blank or overlong ones
    pub fn new(message_id: Snowflake, user_id: Snowflake, emoji: &str) -> Result<Self, DomainError> {
        Ok(Self {
            message_id,
            user_id,
            emoji: normalize_emoji(emoji)?,
            created_at: Utc::now(),
        })
    }
}

/// Trim and validate an emoji
pub fn normalize_emoji(emoji: &str) -> Result<String, DomainError> {
    let emoji = emoji.trim();
    if emoji.is_empty() {
        return Err(DomainError::ValidationError("emoji must not be empty".to_string()));
    }
    if emoji.chars().count() > MAX_EMOJI_LENGTH {
        return Err(DomainError::ValidationError(format!(
            "emoji must be at most {MAX_EMOJI_LENGTH} characters"
        )));
    }
    Ok(emoji.to_string())
}
