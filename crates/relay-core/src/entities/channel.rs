//! Channel entity - a conversation that messages are ordered within

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// Channel type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum ChannelType {
    /// One-to-one conversation
    Private = 1,
    /// Multi-member group
    #[default]
    Group = 2,
    /// System notifications
    System = 3,
    /// Broadcast channel
    Broadcast = 4,
}

impl ChannelType {
    #[inline]
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

impl From<i16> for ChannelType {
    fn from(value: i16) -> Self {
        match value {
            1 => Self::Private,
            3 => Self::System,
            4 => Self::Broadcast,
            _ => Self::Group,
        }
    }
}

/// Channel lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum ChannelStatus {
    #[default]
    Active = 1,
    Disbanded = 2,
    Banned = 3,
}

impl ChannelStatus {
    #[inline]
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

impl From<i16> for ChannelStatus {
    fn from(value: i16) -> Self {
        match value {
            2 => Self::Disbanded,
            3 => Self::Banned,
            _ => Self::Active,
        }
    }
}

/// Channel entity
///
/// `member_count` only counts members whose `left_at` is unset and is kept
/// in step with membership changes inside the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: Snowflake,
    pub channel_type: ChannelType,
    pub name: Option<String>,
    pub owner_id: Snowflake,
    pub member_count: i32,
    pub max_members: i32,
    pub status: ChannelStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(
        id: Snowflake,
        channel_type: ChannelType,
        owner_id: Snowflake,
        name: Option<String>,
        max_members: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            channel_type,
            name,
            owner_id,
            member_count: 0,
            max_members,
            status: ChannelStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == ChannelStatus::Active
    }

    /// Whether another member may join
    #[inline]
    pub fn has_capacity(&self) -> bool {
        self.member_count < self.max_members
    }
}

/// Canonical (lower, higher) ordering of the two users of a private channel
#[inline]
pub fn private_pair(user_a: Snowflake, user_b: Snowflake) -> (Snowflake, Snowflake) {
    if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    }
}
