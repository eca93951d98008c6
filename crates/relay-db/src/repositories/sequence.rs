//! PostgreSQL implementation of SequenceRepository
//!
//! One row per channel in `channel_sequences`. Every increment is a single
//! `INSERT .. ON CONFLICT DO UPDATE .. RETURNING`, so the row lock taken by
//! the upsert serializes concurrent senders and the returned value is
//! durable before any caller sees it.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use relay_core::traits::{RepoResult, SequenceRepository};
use relay_core::value_objects::Snowflake;

use super::error::map_db_error;

/// PostgreSQL implementation of SequenceRepository
#[derive(Clone)]
pub struct PgSequenceRepository {
    pool: PgPool,
}

impl PgSequenceRepository {
    /// Create a new PgSequenceRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SequenceRepository for PgSequenceRepository {
    #[instrument(skip(self))]
    async fn next_seq(&self, channel_id: Snowflake) -> RepoResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO channel_sequences (channel_id, current_seq, updated_at)
            VALUES ($1, 1, NOW())
            ON CONFLICT (channel_id) DO UPDATE
            SET current_seq = channel_sequences.current_seq + 1, updated_at = NOW()
            RETURNING current_seq
            "#,
        )
        .bind(channel_id.into_inner())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }

    #[instrument(skip(self))]
    async fn current_seq(&self, channel_id: Snowflake) -> RepoResult<i64> {
        let current = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT current_seq FROM channel_sequences WHERE channel_id = $1
            "#,
        )
        .bind(channel_id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(current.unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn resync(&self, channel_id: Snowflake) -> RepoResult<i64> {
        // GREATEST keeps the counter from ever moving backwards
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO channel_sequences (channel_id, current_seq, updated_at)
            VALUES ($1, (SELECT COALESCE(MAX(seq_id), 0) FROM messages WHERE channel_id = $1), NOW())
            ON CONFLICT (channel_id) DO UPDATE
            SET current_seq = GREATEST(channel_sequences.current_seq, EXCLUDED.current_seq),
                updated_at = NOW()
            RETURNING current_seq
            "#,
        )
        .bind(channel_id.into_inner())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }
}
