//! Cross-node presence in Redis.
//!
//! One hash per user, `presence:{user_id}`, with one field per gateway node
//! holding the last heartbeat (unix seconds). A user is online while at least
//! one field is fresher than the TTL. The key itself also expires, so a
//! crashed node's entries disappear without cleanup.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tracing::instrument;

use relay_core::traits::{PresenceDirectory, RepoResult};
use relay_core::value_objects::Snowflake;

use crate::pool::{RedisPool, RedisPoolError, RedisResult};

/// Key prefix for user presence
const PRESENCE_PREFIX: &str = "presence:";

/// Presence TTL (refreshed by heartbeat)
pub const DEFAULT_PRESENCE_TTL_SECS: i64 = 120;

/// Whether any node field in `fields` was refreshed within `ttl_secs`
fn any_fresh(fields: &HashMap<String, i64>, now: i64, ttl_secs: i64) -> bool {
    fields.values().any(|&seen| now - seen <= ttl_secs)
}

/// Redis-backed presence directory
#[derive(Clone)]
pub struct RedisPresenceDirectory {
    pool: RedisPool,
    ttl_secs: i64,
}

impl RedisPresenceDirectory {
    #[must_use]
    pub fn new(pool: RedisPool) -> Self {
        Self::with_ttl(pool, DEFAULT_PRESENCE_TTL_SECS)
    }

    #[must_use]
    pub fn with_ttl(pool: RedisPool, ttl_secs: i64) -> Self {
        Self { pool, ttl_secs }
    }

    /// Generate Redis key for user presence
    fn presence_key(user_id: Snowflake) -> String {
        format!("{PRESENCE_PREFIX}{user_id}")
    }

    async fn node_fields(&self, user_id: Snowflake) -> RedisResult<HashMap<String, i64>> {
        let mut conn = self.pool.get().await?;
        let fields: HashMap<String, i64> = conn.hgetall(Self::presence_key(user_id)).await?;
        Ok(fields)
    }
}

#[async_trait]
impl PresenceDirectory for RedisPresenceDirectory {
    #[instrument(skip(self))]
    async fn mark_online(&self, user_id: Snowflake, node_id: &str) -> RepoResult<()> {
        let key = Self::presence_key(user_id);
        let mut conn = self.pool.get().await?;

        redis::pipe()
            .atomic()
            .hset(&key, node_id, Utc::now().timestamp())
            .ignore()
            .expire(&key, self.ttl_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(RedisPoolError::from)?;

        tracing::trace!(user_id = %user_id, node_id, "Presence refreshed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_offline(&self, user_id: Snowflake, node_id: &str) -> RepoResult<()> {
        let mut conn = self.pool.get().await?;
        conn.hdel::<_, _, ()>(Self::presence_key(user_id), node_id)
            .await
            .map_err(RedisPoolError::from)?;

        tracing::debug!(user_id = %user_id, node_id, "Presence cleared");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn is_online(&self, user_id: Snowflake) -> RepoResult<bool> {
        let fields = self.node_fields(user_id).await?;
        Ok(any_fresh(&fields, Utc::now().timestamp(), self.ttl_secs))
    }

    #[instrument(skip(self, user_ids), fields(count = user_ids.len()))]
    async fn offline_among(&self, user_ids: &[Snowflake]) -> RepoResult<Vec<Snowflake>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for &user_id in user_ids {
            pipe.hgetall(Self::presence_key(user_id));
        }

        let mut conn = self.pool.get().await?;
        let all: Vec<HashMap<String, i64>> = pipe
            .query_async(&mut conn)
            .await
            .map_err(RedisPoolError::from)?;

        let now = Utc::now().timestamp();
        Ok(user_ids
            .iter()
            .zip(all.iter())
            .filter(|(_, fields)| !any_fresh(fields, now, self.ttl_secs))
            .map(|(&user_id, _)| user_id)
            .collect())
    }
}
