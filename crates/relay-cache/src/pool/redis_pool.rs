//! Shared deadpool-redis pool for the half-message log, presence and the
//! event publisher. The stream subscriber keeps its own dedicated
//! connection and only borrows the URL from here.

use deadpool_redis::{Config, Pool, Runtime};
use relay_common::RedisConfig;
use relay_core::error::DomainError;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RedisPoolError {
    #[error("Failed to build Redis pool: {0}")]
    Build(String),

    #[error("No Redis connection available: {0}")]
    Checkout(#[from] deadpool_redis::PoolError),

    #[error("Redis command failed: {0}")]
    Command(#[from] redis::RedisError),

    #[error("Failed to encode cache payload: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type RedisResult<T> = Result<T, RedisPoolError>;

impl From<RedisPoolError> for DomainError {
    fn from(e: RedisPoolError) -> Self {
        DomainError::CacheError(e.to_string())
    }
}

/// Cloneable handle to the pool
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
    url: Arc<str>,
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPool")
            .field("url", &redact(&self.url))
            .field("status", &self.pool.status())
            .finish()
    }
}

/// Host part of a Redis URL, without credentials
fn redact(url: &str) -> &str {
    url.rsplit('@').next().unwrap_or(url)
}

impl RedisPool {
    pub fn from_config(config: &RedisConfig) -> RedisResult<Self> {
        let pool = Config::from_url(config.url.as_str())
            .builder()
            .map_err(|e| RedisPoolError::Build(e.to_string()))?
            .max_size(config.max_connections as usize)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| RedisPoolError::Build(e.to_string()))?;

        tracing::info!(
            url = %redact(&config.url),
            max_connections = config.max_connections,
            "Redis pool created"
        );

        Ok(Self {
            pool,
            url: Arc::from(config.url.as_str()),
        })
    }

    pub async fn get(&self) -> RedisResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }

    /// Connection URL, for clients that need a dedicated connection (blocking stream reads)
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// PING through a pooled connection
    pub async fn health_check(&self) -> RedisResult<()> {
        let mut conn = self.get().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
