//! Channel and ChannelMember entity <-> model mapper

use relay_core::entities::{Channel, ChannelMember, ChannelStatus, ChannelType, MemberRole};
use relay_core::value_objects::Snowflake;

use crate::models::{ChannelMemberModel, ChannelModel};

/// Convert ChannelModel to Channel entity
impl From<ChannelModel> for Channel {
    fn from(model: ChannelModel) -> Self {
        Channel {
            id: Snowflake::new(model.id),
            channel_type: ChannelType::from(model.channel_type),
            name: model.name,
            owner_id: Snowflake::new(model.owner_id),
            member_count: model.member_count,
            max_members: model.max_members,
            status: ChannelStatus::from(model.status),
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Convert ChannelMemberModel to ChannelMember entity
impl From<ChannelMemberModel> for ChannelMember {
    fn from(model: ChannelMemberModel) -> Self {
        ChannelMember {
            channel_id: Snowflake::new(model.channel_id),
            user_id: Snowflake::new(model.user_id),
            role: MemberRole::from(model.role),
            last_read_seq: model.last_read_seq,
            unread_count: model.unread_count,
            muted_until: model.muted_until,
            joined_at: model.joined_at,
            left_at: model.left_at,
        }
    }
}

/// Channel entity values for database insertion
pub struct ChannelInsert<'a> {
    pub id: i64,
    pub channel_type: i16,
    pub name: Option<&'a str>,
    pub owner_id: i64,
    pub max_members: i32,
    pub status: i16,
}

impl<'a> ChannelInsert<'a> {
    pub fn new(channel: &'a Channel) -> Self {
        Self {
            id: channel.id.into_inner(),
            channel_type: channel.channel_type.as_i16(),
            name: channel.name.as_deref(),
            owner_id: channel.owner_id.into_inner(),
            max_members: channel.max_members,
            status: channel.status.as_i16(),
        }
    }
}
