//! Control frame payloads

use relay_core::Snowflake;
use serde::{Deserialize, Serialize};

/// Payload for HELLO, sent by the server immediately after connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    /// Default heartbeat interval (41.25 seconds)
    pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 41_250;

    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }
}

impl Default for HelloPayload {
    fn default() -> Self {
        Self::with_interval(Self::DEFAULT_HEARTBEAT_INTERVAL)
    }
}

/// Payload for IDENTIFY, sent by the client to authenticate the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Identity token, with or without a `Bearer ` prefix
    pub token: String,
}

impl IdentifyPayload {
    /// The raw token without any `Bearer ` prefix
    pub fn bare_token(&self) -> &str {
        self.token.strip_prefix("Bearer ").unwrap_or(&self.token)
    }
}

/// Payload for READY, sent once the session is registered on this node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    pub session_id: String,
    pub user_id: Snowflake,
    /// Gateway node holding the session
    pub node_id: String,
}

/// Payload for OFFLINE_ACK, naming the queue entry of an OFFLINE_PUSH
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAckPayload {
    pub entry_id: i64,
}
