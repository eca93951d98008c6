//! PostgreSQL implementation of InboxRepository

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use relay_core::entities::InboxEntry;
use relay_core::traits::{InboxRepository, RepoResult};
use relay_core::value_objects::Snowflake;

use crate::models::InboxModel;

use super::error::map_db_error;

/// PostgreSQL implementation of InboxRepository
#[derive(Clone)]
pub struct PgInboxRepository {
    pool: PgPool,
}

impl PgInboxRepository {
    /// Create a new PgInboxRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InboxRepository for PgInboxRepository {
    #[instrument(skip(self))]
    async fn list_for_user(&self, user_id: Snowflake, limit: i64) -> RepoResult<Vec<InboxEntry>> {
        let limit = limit.clamp(1, 100);

        let results = sqlx::query_as::<_, InboxModel>(
            r#"
            SELECT user_id, message_id, channel_id, sender_id, msg_type,
                   preview, is_read, is_mentioned, created_at
            FROM message_inbox
            WHERE user_id = $1
            ORDER BY created_at DESC, message_id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.into_inner())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        results.into_iter().map(InboxEntry::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn find_by_message(&self, message_id: Snowflake) -> RepoResult<Vec<InboxEntry>> {
        let results = sqlx::query_as::<_, InboxModel>(
            r#"
            SELECT user_id, message_id, channel_id, sender_id, msg_type,
                   preview, is_read, is_mentioned, created_at
            FROM message_inbox
            WHERE message_id = $1
            ORDER BY user_id
            "#,
        )
        .bind(message_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        results.into_iter().map(InboxEntry::try_from).collect()
    }
}
