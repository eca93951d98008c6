//! PostgreSQL implementation of ReadReceiptRepository

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use relay_core::entities::ReadReceipt;
use relay_core::traits::{ReadReceiptRepository, RepoResult};
use relay_core::value_objects::Snowflake;

use super::error::map_db_error;

/// PostgreSQL implementation of ReadReceiptRepository
#[derive(Clone)]
pub struct PgReadReceiptRepository {
    pool: PgPool,
}

impl PgReadReceiptRepository {
    /// Create a new PgReadReceiptRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadReceiptRepository for PgReadReceiptRepository {
    #[instrument(skip(self, receipt), fields(message_id = %receipt.message_id, user_id = %receipt.user_id))]
    async fn mark_as_read(&self, receipt: &ReadReceipt, seq_id: i64) -> RepoResult<bool> {
        let channel_id = receipt.channel_id.into_inner();
        let message_id = receipt.message_id.into_inner();
        let user_id = receipt.user_id.into_inner();

        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, channel_id, user_id, read_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(channel_id)
        .bind(user_id)
        .bind(receipt.read_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?
        .rows_affected()
            == 1;

        sqlx::query(
            r#"
            UPDATE channel_members
            SET unread_count = 0, last_read_seq = $3
            WHERE channel_id = $1 AND user_id = $2
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(seq_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        sqlx::query(
            r#"
            UPDATE message_inbox SET is_read = TRUE
            WHERE user_id = $1 AND message_id = $2
            "#,
        )
        .bind(user_id)
        .bind(message_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;

        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn count_reads(&self, message_id: Snowflake) -> RepoResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM message_reads WHERE message_id = $1
            "#,
        )
        .bind(message_id.into_inner())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }

    #[instrument(skip(self))]
    async fn list_readers(&self, message_id: Snowflake, limit: i64) -> RepoResult<Vec<Snowflake>> {
        let limit = limit.clamp(1, 1000);

        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT user_id FROM message_reads
            WHERE message_id = $1
            ORDER BY read_at DESC, user_id
            LIMIT $2
            "#,
        )
        .bind(message_id.into_inner())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(ids.into_iter().map(Snowflake::new).collect())
    }
}
