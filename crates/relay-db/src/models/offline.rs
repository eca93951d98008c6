//! Offline queue database model

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database model for offline_message_queue table
#[derive(Debug, Clone, FromRow)]
pub struct OfflineEntryModel {
    pub id: i64,
    pub user_id: i64,
    pub message_id: i64,
    pub channel_id: i64,
    pub priority: i32,
    pub retry_count: i32,
    pub max_retry: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
