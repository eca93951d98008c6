//! Offline queue entry - delivery work for a user with no live connection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// Priority given to entries whose message mentions the recipient
pub const MENTION_PRIORITY: i32 = 10;

/// Default priority for ordinary messages
pub const DEFAULT_PRIORITY: i32 = 0;

/// Persisted queue entry. Entries are never deleted: exhausted ones stay
/// with `delivered = false` and no `next_retry_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineQueueEntry {
    /// Insertion order within equal priorities
    pub id: i64,
    pub user_id: Snowflake,
    pub message_id: Snowflake,
    pub channel_id: Snowflake,
    pub priority: i32,
    pub retry_count: i32,
    pub max_retry: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OfflineQueueEntry {
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.retry_count > self.max_retry
    }

    /// Undelivered, not exhausted, and its retry time has come
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.delivered
            && !self.is_exhausted()
            && self.next_retry_at.map_or(true, |at| at <= now)
    }
}

/// Values needed to enqueue a new entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOfflineEntry {
    pub user_id: Snowflake,
    pub message_id: Snowflake,
    pub channel_id: Snowflake,
    pub priority: i32,
    pub max_retry: i32,
}
