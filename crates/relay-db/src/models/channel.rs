//! Channel and membership database models

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database model for channels table
#[derive(Debug, Clone, FromRow)]
pub struct ChannelModel {
    pub id: i64,
    pub channel_type: i16,
    pub name: Option<String>,
    pub owner_id: i64,
    pub member_count: i32,
    pub max_members: i32,
    pub status: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database model for channel_members table
#[derive(Debug, Clone, FromRow)]
pub struct ChannelMemberModel {
    pub channel_id: i64,
    pub user_id: i64,
    pub role: i16,
    pub last_read_seq: i64,
    pub unread_count: i32,
    pub muted_until: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl ChannelMemberModel {
    #[inline]
    pub fn has_left(&self) -> bool {
        self.left_at.is_some()
    }
}
