//! Channel service
//!
//! Channel creation and membership changes. Membership reads used by the
//! delivery engine go through `MembershipDirectory`.

use chrono::Utc;
use relay_core::{Channel, ChannelMember, ChannelType, DomainError, MemberRole, Snowflake};
use tracing::{info, instrument};

use crate::dto::{ChannelResponse, CreateChannelRequest, MemberResponse};

use super::context::ServiceContext;
use super::error::{ServiceError, ServiceResult};

/// Channel service
pub struct ChannelService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> ChannelService<'a> {
    /// Create a new ChannelService
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Create a channel; the caller joins as OWNER
    #[instrument(skip(self, request))]
    pub async fn create_channel(
        &self,
        owner_id: Snowflake,
        request: CreateChannelRequest,
    ) -> ServiceResult<ChannelResponse> {
        if request.channel_type == ChannelType::Private {
            return Err(ServiceError::validation(
                "Private channels are opened with the private channel endpoint",
            ));
        }

        let channel_id = self.ctx.generate_id();
        let mut channel = Channel::new(
            channel_id,
            request.channel_type,
            owner_id,
            request.name,
            request.max_members,
        );
        let owner = ChannelMember::new(channel_id, owner_id, MemberRole::Owner);

        self.ctx.channel_repo().create(&channel, &owner).await?;
        channel.member_count = 1;

        info!(channel_id = %channel_id, owner_id = %owner_id, "Channel created");

        Ok(ChannelResponse::from(&channel))
    }

    /// Get channel by ID; members only
    #[instrument(skip(self))]
    pub async fn get_channel(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<ChannelResponse> {
        let channel = self.find_channel(channel_id).await?;
        self.require_member(channel_id, user_id).await?;
        Ok(ChannelResponse::from(&channel))
    }

    /// The private channel between the caller and `target_id`, created on
    /// first use. Concurrent first calls from either side get the same
    /// channel.
    #[instrument(skip(self))]
    pub async fn get_or_create_private(
        &self,
        user_id: Snowflake,
        target_id: Snowflake,
    ) -> ServiceResult<ChannelResponse> {
        if user_id == target_id {
            return Err(ServiceError::validation(
                "A private channel needs two different users",
            ));
        }

        if let Some(channel) = self
            .ctx
            .membership()
            .find_private_channel(user_id, target_id)
            .await?
        {
            return Ok(ChannelResponse::from(&channel).with_peer(target_id));
        }

        let channel_id = self.ctx.generate_id();
        let channel = Channel::new(channel_id, ChannelType::Private, user_id, None, 2);
        let members = [
            ChannelMember::new(channel_id, user_id, MemberRole::Owner),
            ChannelMember::new(channel_id, target_id, MemberRole::Member),
        ];
        let stored = self
            .ctx
            .channel_repo()
            .create_private(&channel, &members)
            .await?;

        if stored.id == channel_id {
            info!(
                channel_id = %channel_id,
                user_id = %user_id,
                target_id = %target_id,
                "Private channel created"
            );
        }

        Ok(ChannelResponse::from(&stored).with_peer(target_id))
    }

    /// Active members, oldest first; members only
    #[instrument(skip(self))]
    pub async fn list_members(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<Vec<MemberResponse>> {
        self.find_channel(channel_id).await?;
        self.require_member(channel_id, user_id).await?;

        let members = self.ctx.membership().list_members(channel_id).await?;
        Ok(members.iter().map(MemberResponse::from).collect())
    }

    /// Channels the caller belongs to, most recently active first. Private
    /// channels carry the other member as `peer_id`.
    #[instrument(skip(self))]
    pub async fn user_channels(&self, user_id: Snowflake) -> ServiceResult<Vec<ChannelResponse>> {
        let channels = self.ctx.membership().channels_of(user_id).await?;

        let mut responses = Vec::with_capacity(channels.len());
        for channel in &channels {
            let response = ChannelResponse::from(channel);
            if channel.channel_type != ChannelType::Private {
                responses.push(response);
                continue;
            }
            let peer = self
                .ctx
                .membership()
                .list_members(channel.id)
                .await?
                .into_iter()
                .map(|m| m.user_id)
                .find(|&id| id != user_id);
            responses.push(match peer {
                Some(peer_id) => response.with_peer(peer_id),
                None => response,
            });
        }
        Ok(responses)
    }

    /// Grant (`is_admin`) or revoke ADMIN. Only the OWNER may do either, and
    /// the owner's own role never changes.
    #[instrument(skip(self))]
    pub async fn set_admin(
        &self,
        channel_id: Snowflake,
        actor_id: Snowflake,
        user_id: Snowflake,
        is_admin: bool,
    ) -> ServiceResult<MemberResponse> {
        let channel = self.find_channel(channel_id).await?;
        let actor = self.require_member(channel_id, actor_id).await?;
        if actor.role != MemberRole::Owner {
            return Err(ServiceError::permission_denied("GRANT_ADMIN"));
        }
        if channel.owner_id == user_id {
            return Err(ServiceError::conflict("The channel owner's role cannot change"));
        }

        let mut member = self.require_member(channel_id, user_id).await?;
        let role = if is_admin {
            MemberRole::Admin
        } else {
            MemberRole::Member
        };
        self.ctx
            .channel_repo()
            .set_role(channel_id, user_id, role)
            .await?;
        member.role = role;

        info!(channel_id = %channel_id, user_id = %user_id, role = ?role, "Member role changed");

        Ok(MemberResponse::from(&member))
    }

    /// Add (or re-add) `user_id`. The actor must be an ADMIN or OWNER, and
    /// only the OWNER may grant ADMIN.
    #[instrument(skip(self))]
    pub async fn add_member(
        &self,
        channel_id: Snowflake,
        actor_id: Snowflake,
        user_id: Snowflake,
        role: MemberRole,
    ) -> ServiceResult<MemberResponse> {
        let channel = self.find_channel(channel_id).await?;
        if channel.channel_type == ChannelType::Private {
            return Err(ServiceError::validation("Private channels have exactly two members"));
        }
        let actor = self.require_member(channel_id, actor_id).await?;

        if !actor.role.can_moderate() {
            return Err(ServiceError::permission_denied("MANAGE_MEMBERS"));
        }
        match role {
            MemberRole::Owner => {
                return Err(ServiceError::validation("A channel has exactly one owner"));
            }
            MemberRole::Admin if actor.role != MemberRole::Owner => {
                return Err(ServiceError::permission_denied("GRANT_ADMIN"));
            }
            _ => {}
        }

        let member = ChannelMember::new(channel_id, user_id, role);
        self.ctx.channel_repo().add_member(&member).await?;

        info!(channel_id = %channel_id, user_id = %user_id, role = ?role, "Member added");

        Ok(MemberResponse::from(&member))
    }

    /// Remove a member. Members may leave on their own; removing someone
    /// else needs ADMIN or OWNER. The owner cannot be removed.
    #[instrument(skip(self))]
    pub async fn remove_member(
        &self,
        channel_id: Snowflake,
        actor_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<()> {
        let channel = self.find_channel(channel_id).await?;
        if channel.owner_id == user_id {
            return Err(ServiceError::conflict("The channel owner cannot leave"));
        }

        if actor_id != user_id {
            let actor = self.require_member(channel_id, actor_id).await?;
            if !actor.role.can_moderate() {
                return Err(ServiceError::permission_denied("MANAGE_MEMBERS"));
            }
        }

        self.ctx.channel_repo().remove_member(channel_id, user_id).await?;

        info!(channel_id = %channel_id, user_id = %user_id, by = %actor_id, "Member removed");

        Ok(())
    }

    /// Load a channel or fail with `ChannelNotFound`
    pub(crate) async fn find_channel(&self, channel_id: Snowflake) -> ServiceResult<Channel> {
        self.ctx
            .membership()
            .find_channel(channel_id)
            .await?
            .ok_or_else(|| DomainError::ChannelNotFound(channel_id).into())
    }

    /// Active membership of `user_id` or `NotChannelMember`
    pub(crate) async fn require_member(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<ChannelMember> {
        self.ctx
            .membership()
            .find_member(channel_id, user_id)
            .await?
            .filter(ChannelMember::is_active)
            .ok_or_else(|| DomainError::NotChannelMember.into())
    }

    /// Membership that may post right now
    pub(crate) async fn require_sender(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
    ) -> ServiceResult<ChannelMember> {
        let member = self.require_member(channel_id, user_id).await?;
        if let Some(until) = member.muted_until.filter(|&until| until > Utc::now()) {
            return Err(DomainError::MemberMuted(until).into());
        }
        Ok(member)
    }
}
