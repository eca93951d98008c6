//! PostgreSQL implementation of MessageRepository

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::instrument;

use relay_core::entities::{InboxEntry, Message, MessageStatus, RecallRecord};
use relay_core::traits::{MessageRepository, RepoResult, SyncQuery};
use relay_core::value_objects::Snowflake;

use crate::mappers::{ids_to_i64, InboxBatch, MessageInsert};
use crate::models::{MessageModel, RecallModel};

use super::error::map_db_error;

const MESSAGE_COLUMNS: &str = "id, channel_id, sender_id, seq_id, msg_type, content, media_urls, \
     reply_to_msg_id, forward_from_msg_id, mentioned_user_ids, mention_all, status, created_at";

/// PostgreSQL implementation of MessageRepository
#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Create a new PgMessageRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    #[instrument(skip(self, message, inbox), fields(message_id = %message.id, channel_id = %message.channel_id, seq_id = message.seq_id, inbox_rows = inbox.len()))]
    async fn insert_with_inbox(&self, message: &Message, inbox: &[InboxEntry]) -> RepoResult<()> {
        let insert = MessageInsert::new(message);
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        sqlx::query(
            r#"
            INSERT INTO messages (
                id, channel_id, sender_id, seq_id, msg_type, content, media_urls,
                reply_to_msg_id, forward_from_msg_id, mentioned_user_ids, mention_all,
                status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(insert.id)
        .bind(insert.channel_id)
        .bind(insert.sender_id)
        .bind(insert.seq_id)
        .bind(insert.msg_type)
        .bind(Json(&message.content))
        .bind(insert.media_urls)
        .bind(insert.reply_to_msg_id)
        .bind(insert.forward_from_msg_id)
        .bind(&insert.mentioned_user_ids)
        .bind(insert.mention_all)
        .bind(insert.status)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let batch = InboxBatch::new(inbox);
        if !batch.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO message_inbox (
                    user_id, message_id, channel_id, sender_id, msg_type,
                    preview, is_read, is_mentioned, created_at
                )
                SELECT t.user_id, $4, $5, $6, $7, t.preview, FALSE, t.is_mentioned, $8
                FROM UNNEST($1::BIGINT[], $2::TEXT[], $3::BOOLEAN[]) AS t(user_id, preview, is_mentioned)
                "#,
            )
            .bind(&batch.user_ids)
            .bind(&batch.previews)
            .bind(&batch.mentioned)
            .bind(insert.id)
            .bind(insert.channel_id)
            .bind(insert.sender_id)
            .bind(insert.msg_type)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }

        sqlx::query(
            r#"
            UPDATE channel_members
            SET unread_count = unread_count + 1
            WHERE channel_id = $1 AND user_id <> $2 AND left_at IS NULL
            "#,
        )
        .bind(insert.channel_id)
        .bind(insert.sender_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn exists(&self, message_id: Snowflake) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM messages WHERE id = $1)
            "#,
        )
        .bind(message_id.into_inner())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, message_id: Snowflake) -> RepoResult<Option<Message>> {
        let result = sqlx::query_as::<_, MessageModel>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(message_id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.map(Message::from))
    }

    #[instrument(skip(self, message_ids), fields(count = message_ids.len()))]
    async fn find_by_ids(&self, message_ids: &[Snowflake]) -> RepoResult<Vec<Message>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let results = sqlx::query_as::<_, MessageModel>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids_to_i64(message_ids))
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(results.into_iter().map(Message::from).collect())
    }

    #[instrument(skip(self))]
    async fn sync(&self, channel_id: Snowflake, query: SyncQuery) -> RepoResult<Vec<Message>> {
        let limit = query.limit.clamp(1, 100);

        let results = sqlx::query_as::<_, MessageModel>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE channel_id = $1 AND seq_id > $2 \
             ORDER BY seq_id ASC LIMIT $3"
        ))
        .bind(channel_id.into_inner())
        .bind(query.cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(results.into_iter().map(Message::from).collect())
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        message_id: Snowflake,
        from: MessageStatus,
        to: MessageStatus,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET status = $3 WHERE id = $1 AND status = $2
            "#,
        )
        .bind(message_id.into_inner())
        .bind(from.as_i16())
        .bind(to.as_i16())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, record), fields(message_id = %record.message_id, by = %record.recalled_by))]
    async fn recall(&self, record: &RecallRecord) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let result = sqlx::query(
            r#"
            UPDATE messages SET status = $3 WHERE id = $1 AND status = $2
            "#,
        )
        .bind(record.message_id.into_inner())
        .bind(MessageStatus::Normal.as_i16())
        .bind(MessageStatus::Recalled.as_i16())
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls it back
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO message_recalls (
                message_id, channel_id, sender_id, recall_by, reason, original_content, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.message_id.into_inner())
        .bind(record.channel_id.into_inner())
        .bind(record.sender_id.into_inner())
        .bind(record.recalled_by.into_inner())
        .bind(record.reason.as_deref())
        .bind(Json(&record.original_content))
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;

        Ok(true)
    }

    #[instrument(skip(self))]
    async fn find_recall(&self, message_id: Snowflake) -> RepoResult<Option<RecallRecord>> {
        let result = sqlx::query_as::<_, RecallModel>(
            r#"
            SELECT message_id, channel_id, sender_id, recall_by, reason, original_content,
                   created_at
            FROM message_recalls
            WHERE message_id = $1
            "#,
        )
        .bind(message_id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.map(RecallRecord::from))
    }

    #[instrument(skip(self))]
    async fn mentioning(
        &self,
        user_id: Snowflake,
        before: Option<Snowflake>,
        limit: i64,
    ) -> RepoResult<Vec<Message>> {
        let limit = limit.clamp(1, 100);

        let results = sqlx::query_as::<_, MessageModel>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE mentioned_user_ids @> ARRAY[$1::BIGINT] \
               AND status = $2 \
               AND ($3::BIGINT IS NULL OR id < $3) \
             ORDER BY id DESC LIMIT $4"
        ))
        .bind(user_id.into_inner())
        .bind(MessageStatus::Normal.as_i16())
        .bind(before.map(Snowflake::into_inner))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(results.into_iter().map(Message::from).collect())
    }
}
