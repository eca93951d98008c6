//! Read receipt - at most one per (message_id, user_id)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub message_id: Snowflake,
    pub channel_id: Snowflake,
    pub user_id: Snowflake,
    pub read_at: DateTime<Utc>,
}

impl ReadReceipt {
    pub fn new(message_id: Snowflake, channel_id: Snowflake, user_id: Snowflake) -> Self {
        Self {
            message_id,
            channel_id,
            user_id,
            read_at: Utc::now(),
        }
    }
}
