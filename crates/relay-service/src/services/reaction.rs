//! Reaction service
//!
//! Emoji reactions on messages. Reactions are stored outside the timeline and
//! do not go through the delivery engine.

use relay_core::entities::normalize_emoji;
use relay_core::{DomainError, Message, MessageStatus, Reaction, Snowflake};
use tracing::{debug, instrument};

use crate::dto::ReactionResponse;

use super::channel::ChannelService;
use super::context::ServiceContext;
use super::error::{ServiceError, ServiceResult};

/// Reaction service
pub struct ReactionService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> ReactionService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// React to a NORMAL message. Returns false if the caller already had
    /// this reaction.
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        user_id: Snowflake,
        emoji: &str,
    ) -> ServiceResult<bool> {
        let message = self.visible_message(channel_id, message_id, user_id).await?;
        if message.status != MessageStatus::Normal {
            return Err(ServiceError::conflict(format!(
                "Cannot react to a {:?} message",
                message.status
            )));
        }

        let reaction = Reaction::new(message_id, user_id, emoji)?;
        let added = self.ctx.reaction_repo().add(&reaction).await?;
        debug!(message_id = %message_id, user_id = %user_id, added, "Reaction added");
        Ok(added)
    }

    /// Withdraw the caller's reaction. Returns false if there was none.
    #[instrument(skip(self))]
    pub async fn remove(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        user_id: Snowflake,
        emoji: &str,
    ) -> ServiceResult<bool> {
        self.visible_message(channel_id, message_id, user_id).await?;
        let emoji = normalize_emoji(emoji)?;
        Ok(self
            .ctx
            .reaction_repo()
            .remove(message_id, user_id, &emoji)
            .await?)
    }

    /// Every reaction on a message, oldest first
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<Vec<ReactionResponse>> {
        self.visible_message(channel_id, message_id, user_id).await?;
        let reactions = self.ctx.reaction_repo().list_for_message(message_id).await?;
        Ok(reactions.into_iter().map(ReactionResponse::from).collect())
    }

    /// The message, if it is in this channel and the caller is a member
    async fn visible_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<Message> {
        ChannelService::new(self.ctx)
            .require_member(channel_id, user_id)
            .await?;
        self.ctx
            .message_repo()
            .find_by_id(message_id)
            .await?
            .filter(|m| m.channel_id == channel_id && m.status != MessageStatus::Deleted)
            .ok_or_else(|| DomainError::MessageNotFound(message_id).into())
    }
}
