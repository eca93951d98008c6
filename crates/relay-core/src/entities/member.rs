//! Channel member - a user's seat in a channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// Member role inside a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum MemberRole {
    #[default]
    Member = 1,
    Admin = 2,
    Owner = 3,
}

impl MemberRole {
    #[inline]
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    /// Admins and owners may act on other members' messages
    #[inline]
    pub fn can_moderate(self) -> bool {
        self >= Self::Admin
    }
}

impl From<i16> for MemberRole {
    fn from(value: i16) -> Self {
        match value {
            2 => Self::Admin,
            3 => Self::Owner,
            _ => Self::Member,
        }
    }
}

/// Channel member entity, unique per (channel_id, user_id)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMember {
    pub channel_id: Snowflake,
    pub user_id: Snowflake,
    pub role: MemberRole,
    pub last_read_seq: i64,
    pub unread_count: i32,
    pub muted_until: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
    /// Soft-leave marker; `None` means the member is active
    pub left_at: Option<DateTime<Utc>>,
}

impl ChannelMember {
    pub fn new(channel_id: Snowflake, user_id: Snowflake, role: MemberRole) -> Self {
        Self {
            channel_id,
            user_id,
            role,
            last_read_seq: 0,
            unread_count: 0,
            muted_until: None,
            joined_at: Utc::now(),
            left_at: None,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }

    #[inline]
    pub fn is_muted_at(&self, now: DateTime<Utc>) -> bool {
        self.muted_until.is_some_and(|until| until > now)
    }
}
