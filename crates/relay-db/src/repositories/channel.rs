//! PostgreSQL implementation of ChannelRepository and MembershipDirectory
//!
//! `channels.member_count` is only ever changed in the same transaction as
//! the membership row it accounts for. Private channels are indexed by
//! their ordered user pair in `private_channels`.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use relay_core::entities::{private_pair, Channel, ChannelMember, ChannelStatus, MemberRole};
use relay_core::error::DomainError;
use relay_core::traits::{ChannelRepository, MembershipDirectory, RepoResult};
use relay_core::value_objects::Snowflake;

use crate::mappers::ChannelInsert;
use crate::models::{ChannelMemberModel, ChannelModel};

use super::error::{channel_not_found, map_db_error, map_unique_violation, member_not_found};

/// PostgreSQL implementation of ChannelRepository
#[derive(Clone)]
pub struct PgChannelRepository {
    pool: PgPool,
}

impl PgChannelRepository {
    /// Create a new PgChannelRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_member(
        tx: &mut Transaction<'_, Postgres>,
        member: &ChannelMember,
    ) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO channel_members (channel_id, user_id, role, muted_until, joined_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (channel_id, user_id) DO UPDATE
            SET role = EXCLUDED.role,
                unread_count = 0,
                muted_until = EXCLUDED.muted_until,
                joined_at = EXCLUDED.joined_at,
                left_at = NULL
            "#,
        )
        .bind(member.channel_id.into_inner())
        .bind(member.user_id.into_inner())
        .bind(member.role.as_i16())
        .bind(member.muted_until)
        .bind(member.joined_at)
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn insert_channel(
        tx: &mut Transaction<'_, Postgres>,
        channel: &Channel,
        member_count: i32,
    ) -> RepoResult<()> {
        let insert = ChannelInsert::new(channel);
        sqlx::query(
            r#"
            INSERT INTO channels (id, channel_type, name, owner_id, member_count, max_members,
                                  status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            "#,
        )
        .bind(insert.id)
        .bind(insert.channel_type)
        .bind(insert.name)
        .bind(insert.owner_id)
        .bind(member_count)
        .bind(insert.max_members)
        .bind(insert.status)
        .bind(channel.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            map_unique_violation(e, || {
                DomainError::ValidationError(format!("channel {} already exists", channel.id))
            })
        })?;

        Ok(())
    }
}

#[async_trait]
impl MembershipDirectory for PgChannelRepository {
    #[instrument(skip(self))]
    async fn find_channel(&self, channel_id: Snowflake) -> RepoResult<Option<Channel>> {
        let result = sqlx::query_as::<_, ChannelModel>(
            r#"
            SELECT id, channel_type, name, owner_id, member_count, max_members, status,
                   created_at, updated_at
            FROM channels
            WHERE id = $1
            "#,
        )
        .bind(channel_id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.map(Channel::from))
    }

    #[instrument(skip(self))]
    async fn find_member(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
    ) -> RepoResult<Option<ChannelMember>> {
        let result = sqlx::query_as::<_, ChannelMemberModel>(
            r#"
            SELECT channel_id, user_id, role, last_read_seq, unread_count, muted_until,
                   joined_at, left_at
            FROM channel_members
            WHERE channel_id = $1 AND user_id = $2 AND left_at IS NULL
            "#,
        )
        .bind(channel_id.into_inner())
        .bind(user_id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.map(ChannelMember::from))
    }

    #[instrument(skip(self))]
    async fn member_ids(&self, channel_id: Snowflake) -> RepoResult<Vec<Snowflake>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT user_id FROM channel_members
            WHERE channel_id = $1 AND left_at IS NULL
            ORDER BY user_id
            "#,
        )
        .bind(channel_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(ids.into_iter().map(Snowflake::new).collect())
    }

    #[instrument(skip(self))]
    async fn live_member_count(&self, channel_id: Snowflake) -> RepoResult<i64> {
        // Counted from membership rows rather than the denormalized column
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM channel_members
            WHERE channel_id = $1 AND left_at IS NULL
            "#,
        )
        .bind(channel_id.into_inner())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }

    #[instrument(skip(self))]
    async fn list_members(&self, channel_id: Snowflake) -> RepoResult<Vec<ChannelMember>> {
        let results = sqlx::query_as::<_, ChannelMemberModel>(
            r#"
            SELECT channel_id, user_id, role, last_read_seq, unread_count, muted_until,
                   joined_at, left_at
            FROM channel_members
            WHERE channel_id = $1 AND left_at IS NULL
            ORDER BY joined_at ASC, user_id ASC
            "#,
        )
        .bind(channel_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(results.into_iter().map(ChannelMember::from).collect())
    }

    #[instrument(skip(self))]
    async fn channels_of(&self, user_id: Snowflake) -> RepoResult<Vec<Channel>> {
        let results = sqlx::query_as::<_, ChannelModel>(
            r#"
            SELECT c.id, c.channel_type, c.name, c.owner_id, c.member_count, c.max_members,
                   c.status, c.created_at, c.updated_at
            FROM channels c
            JOIN channel_members m ON m.channel_id = c.id
            WHERE m.user_id = $1 AND m.left_at IS NULL
            ORDER BY c.updated_at DESC, c.id DESC
            "#,
        )
        .bind(user_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(results.into_iter().map(Channel::from).collect())
    }

    #[instrument(skip(self))]
    async fn find_private_channel(
        &self,
        user_a: Snowflake,
        user_b: Snowflake,
    ) -> RepoResult<Option<Channel>> {
        let (low, high) = private_pair(user_a, user_b);
        let result = sqlx::query_as::<_, ChannelModel>(
            r#"
            SELECT c.id, c.channel_type, c.name, c.owner_id, c.member_count, c.max_members,
                   c.status, c.created_at, c.updated_at
            FROM private_channels p
            JOIN channels c ON c.id = p.channel_id
            WHERE p.user_low = $1 AND p.user_high = $2
            "#,
        )
        .bind(low.into_inner())
        .bind(high.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.map(Channel::from))
    }
}

#[async_trait]
impl ChannelRepository for PgChannelRepository {
    #[instrument(skip(self, channel, owner), fields(channel_id = %channel.id))]
    async fn create(&self, channel: &Channel, owner: &ChannelMember) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        Self::insert_channel(&mut tx, channel, 1).await?;
        Self::insert_member(&mut tx, owner).await?;

        tx.commit().await.map_err(map_db_error)?;

        Ok(())
    }

    #[instrument(skip(self, member), fields(channel_id = %member.channel_id, user_id = %member.user_id))]
    async fn add_member(&self, member: &ChannelMember) -> RepoResult<()> {
        let channel_id = member.channel_id.into_inner();
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Row lock on the channel serializes concurrent joins against the cap
        let channel = sqlx::query_as::<_, (i32, i32, i16)>(
            r#"
            SELECT member_count, max_members, status FROM channels WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(channel_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let Some((member_count, max_members, status)) = channel else {
            return Err(channel_not_found(member.channel_id));
        };

        if ChannelStatus::from(status) != ChannelStatus::Active {
            return Err(DomainError::ChannelInactive);
        }

        let already_active = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM channel_members
                WHERE channel_id = $1 AND user_id = $2 AND left_at IS NULL
            )
            "#,
        )
        .bind(channel_id)
        .bind(member.user_id.into_inner())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;

        if already_active {
            return Err(DomainError::AlreadyMember);
        }

        if member_count >= max_members {
            return Err(DomainError::ChannelFull { max: max_members });
        }

        Self::insert_member(&mut tx, member).await?;

        sqlx::query(
            r#"
            UPDATE channels SET member_count = member_count + 1, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(channel_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_member(&self, channel_id: Snowflake, user_id: Snowflake) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let result = sqlx::query(
            r#"
            UPDATE channel_members SET left_at = NOW()
            WHERE channel_id = $1 AND user_id = $2 AND left_at IS NULL
            "#,
        )
        .bind(channel_id.into_inner())
        .bind(user_id.into_inner())
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(member_not_found());
        }

        sqlx::query(
            r#"
            UPDATE channels SET member_count = GREATEST(member_count - 1, 0), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(channel_id.into_inner())
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;

        Ok(())
    }

    #[instrument(skip(self, channel, members), fields(channel_id = %channel.id))]
    async fn create_private(
        &self,
        channel: &Channel,
        members: &[ChannelMember; 2],
    ) -> RepoResult<Channel> {
        let (low, high) = private_pair(members[0].user_id, members[1].user_id);
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        Self::insert_channel(&mut tx, channel, 2).await?;

        // The pair's primary key decides the race between concurrent creators
        let claimed = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO private_channels (user_low, user_high, channel_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_low, user_high) DO NOTHING
            RETURNING channel_id
            "#,
        )
        .bind(low.into_inner())
        .bind(high.into_inner())
        .bind(channel.id.into_inner())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?;

        if claimed.is_none() {
            tx.rollback().await.map_err(map_db_error)?;
            return self
                .find_private_channel(low, high)
                .await?
                .ok_or_else(|| channel_not_found(channel.id));
        }

        for member in members {
            Self::insert_member(&mut tx, member).await?;
        }
        tx.commit().await.map_err(map_db_error)?;

        let mut created = channel.clone();
        created.member_count = 2;
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn set_role(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
        role: MemberRole,
    ) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE channel_members SET role = $3
            WHERE channel_id = $1 AND user_id = $2 AND left_at IS NULL
            "#,
        )
        .bind(channel_id.into_inner())
        .bind(user_id.into_inner())
        .bind(role.as_i16())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(member_not_found());
        }

        Ok(())
    }
}
