//! Half messages in Redis.
//!
//! Entries live in one hash, `message_id -> HalfMessage JSON`. Publishing
//! leases live in a second hash, `message_id -> lease start (unix ms)`. A
//! claim is a Lua script so checking the entry and recording the lease is
//! one step: when the submit path and a reconciler race for the same
//! message, exactly one of them wins until the lease lapses.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Script};
use tracing::instrument;

use relay_core::events::HalfMessage;
use relay_core::traits::{HalfMessageLog, RepoResult};
use relay_core::value_objects::Snowflake;

use crate::pool::{RedisPool, RedisPoolError};

/// Hash holding every pending half message
pub const DEFAULT_HALF_MESSAGE_KEY: &str = "relay:half";

/// KEYS[1] entries, KEYS[2] leases; ARGV[1] id, ARGV[2] now, ARGV[3] expiry
const CLAIM_SCRIPT: &str = r#"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 0 then
    return 0
end
local leased_at = redis.call('HGET', KEYS[2], ARGV[1])
if leased_at and tonumber(leased_at) >= tonumber(ARGV[3]) then
    return 0
end
redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
return 1
"#;

#[derive(Clone)]
pub struct RedisHalfMessageLog {
    pool: RedisPool,
    key: String,
    lease_key: String,
    claim: Arc<Script>,
}

impl RedisHalfMessageLog {
    #[must_use]
    pub fn new(pool: RedisPool) -> Self {
        Self::with_key(pool, DEFAULT_HALF_MESSAGE_KEY)
    }

    #[must_use]
    pub fn with_key(pool: RedisPool, key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            pool,
            lease_key: lease_key(&key),
            key,
            claim: Arc::new(Script::new(CLAIM_SCRIPT)),
        }
    }
}

fn lease_key(key: &str) -> String {
    format!("{key}:leases")
}

/// Decode stored entries older than `cutoff`, skipping unreadable ones
fn stale_entries(raw: HashMap<String, String>, cutoff: DateTime<Utc>) -> Vec<HalfMessage> {
    let mut stale: Vec<HalfMessage> = raw
        .into_iter()
        .filter_map(|(field, json)| match serde_json::from_str::<HalfMessage>(&json) {
            Ok(half) => Some(half),
            Err(e) => {
                tracing::warn!(field = %field, error = %e, "Unreadable half message");
                None
            }
        })
        .filter(|half| half.is_stale(cutoff))
        .collect();
    stale.sort_by_key(|half| half.prepared_at);
    stale
}

#[async_trait]
impl HalfMessageLog for RedisHalfMessageLog {
    #[instrument(skip(self, half), fields(message_id = %half.message_id()))]
    async fn prepare(&self, half: &HalfMessage) -> RepoResult<()> {
        let json = serde_json::to_string(half).map_err(RedisPoolError::from)?;
        let mut conn = self.pool.get().await?;
        conn.hset::<_, _, _, ()>(&self.key, half.message_id().to_string(), json)
            .await
            .map_err(RedisPoolError::from)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn claim(
        &self,
        message_id: Snowflake,
        expired_before: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let mut conn = self.pool.get().await?;
        let claimed: i64 = self
            .claim
            .key(&self.key)
            .key(&self.lease_key)
            .arg(message_id.to_string())
            .arg(Utc::now().timestamp_millis())
            .arg(expired_before.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(RedisPoolError::from)?;
        Ok(claimed == 1)
    }

    #[instrument(skip(self))]
    async fn release(&self, message_id: Snowflake) -> RepoResult<()> {
        let mut conn = self.pool.get().await?;
        conn.hdel::<_, _, ()>(&self.lease_key, message_id.to_string())
            .await
            .map_err(RedisPoolError::from)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn complete(&self, message_id: Snowflake) -> RepoResult<bool> {
        let mut conn = self.pool.get().await?;
        let field = message_id.to_string();
        let (removed, _): (i64, i64) = redis::pipe()
            .atomic()
            .hdel(&self.key, &field)
            .hdel(&self.lease_key, &field)
            .query_async(&mut conn)
            .await
            .map_err(RedisPoolError::from)?;
        Ok(removed == 1)
    }

    #[instrument(skip(self))]
    async fn stale(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<HalfMessage>> {
        let mut conn = self.pool.get().await?;
        let raw: HashMap<String, String> = conn
            .hgetall(&self.key)
            .await
            .map_err(RedisPoolError::from)?;
        Ok(stale_entries(raw, cutoff))
    }
}
