//! PostgreSQL implementation of OfflineQueueRepository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use relay_core::entities::{NewOfflineEntry, OfflineQueueEntry};
use relay_core::traits::{OfflineQueueRepository, RepoResult};
use relay_core::value_objects::Snowflake;

use crate::models::OfflineEntryModel;

use super::error::map_db_error;

/// PostgreSQL implementation of OfflineQueueRepository
#[derive(Clone)]
pub struct PgOfflineQueueRepository {
    pool: PgPool,
}

impl PgOfflineQueueRepository {
    /// Create a new PgOfflineQueueRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OfflineQueueRepository for PgOfflineQueueRepository {
    #[instrument(skip(self))]
    async fn enqueue(&self, entry: &NewOfflineEntry) -> RepoResult<OfflineQueueEntry> {
        let model = sqlx::query_as::<_, OfflineEntryModel>(
            r#"
            INSERT INTO offline_message_queue (user_id, message_id, channel_id, priority, max_retry)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, message_id, channel_id, priority, retry_count, max_retry,
                      next_retry_at, delivered, delivered_at, created_at
            "#,
        )
        .bind(entry.user_id.into_inner())
        .bind(entry.message_id.into_inner())
        .bind(entry.channel_id.into_inner())
        .bind(entry.priority)
        .bind(entry.max_retry)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(OfflineQueueEntry::from(model))
    }

    #[instrument(skip(self))]
    async fn pending_for_user(
        &self,
        user_id: Snowflake,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepoResult<Vec<OfflineQueueEntry>> {
        let limit = limit.clamp(1, 1000);

        let results = sqlx::query_as::<_, OfflineEntryModel>(
            r#"
            SELECT id, user_id, message_id, channel_id, priority, retry_count, max_retry,
                   next_retry_at, delivered, delivered_at, created_at
            FROM offline_message_queue
            WHERE user_id = $1
              AND delivered = FALSE
              AND retry_count <= max_retry
              AND (next_retry_at IS NULL OR next_retry_at <= $2)
            ORDER BY priority DESC, id ASC
            LIMIT $3
            "#,
        )
        .bind(user_id.into_inner())
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(results.into_iter().map(OfflineQueueEntry::from).collect())
    }

    #[instrument(skip(self))]
    async fn mark_delivered(&self, entry_id: i64, user_id: Snowflake) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE offline_message_queue
            SET delivered = TRUE, delivered_at = NOW()
            WHERE id = $1 AND user_id = $2 AND delivered = FALSE
            "#,
        )
        .bind(entry_id)
        .bind(user_id.into_inner())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            tracing::debug!(entry_id, "Offline entry already delivered, missing, or not owned");
        }

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn record_attempt(
        &self,
        entry_id: i64,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE offline_message_queue
            SET retry_count = retry_count + 1, next_retry_at = $2
            WHERE id = $1 AND delivered = FALSE
            "#,
        )
        .bind(entry_id)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            tracing::debug!(entry_id, "Offline entry delivered concurrently or missing");
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_user(&self, user_id: Snowflake) -> RepoResult<Vec<OfflineQueueEntry>> {
        let results = sqlx::query_as::<_, OfflineEntryModel>(
            r#"
            SELECT id, user_id, message_id, channel_id, priority, retry_count, max_retry,
                   next_retry_at, delivered, delivered_at, created_at
            FROM offline_message_queue
            WHERE user_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(user_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(results.into_iter().map(OfflineQueueEntry::from).collect())
    }
}
