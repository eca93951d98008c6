//! Collaborator traits - membership, moderation, presence, and the publish
//! transport consulted by the delivery engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::repositories::RepoResult;
use crate::entities::{Channel, ChannelMember, MessageContent};
use crate::events::{HalfMessage, MessageCommittedEvent};
use crate::value_objects::Snowflake;

// ============================================================================
// Membership
// ============================================================================

#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// Find channel by ID
    async fn find_channel(&self, channel_id: Snowflake) -> RepoResult<Option<Channel>>;

    /// Active membership of a user, if any
    async fn find_member(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
    ) -> RepoResult<Option<ChannelMember>>;

    /// Ids of all active members
    async fn member_ids(&self, channel_id: Snowflake) -> RepoResult<Vec<Snowflake>>;

    /// Number of active members, read fresh
    async fn live_member_count(&self, channel_id: Snowflake) -> RepoResult<i64>;

    /// Active members ordered by join time
    async fn list_members(&self, channel_id: Snowflake) -> RepoResult<Vec<ChannelMember>>;

    /// Channels where `user_id` is an active member, most recently updated first
    async fn channels_of(&self, user_id: Snowflake) -> RepoResult<Vec<Channel>>;

    /// The private channel of an unordered user pair
    async fn find_private_channel(
        &self,
        user_a: Snowflake,
        user_b: Snowflake,
    ) -> RepoResult<Option<Channel>>;

    async fn is_member(&self, channel_id: Snowflake, user_id: Snowflake) -> RepoResult<bool> {
        Ok(self.find_member(channel_id, user_id).await?.is_some())
    }
}

// ============================================================================
// Moderation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationVerdict {
    Approve,
    /// Store as UNDER_REVIEW
    Review,
}

#[async_trait]
pub trait ModerationPolicy: Send + Sync {
    async fn review(&self, content: &MessageContent) -> ModerationVerdict;
}

// ============================================================================
// Presence
// ============================================================================

/// Process-wide view of which users are connected on any node
#[async_trait]
pub trait PresenceDirectory: Send + Sync {
    async fn mark_online(&self, user_id: Snowflake, node_id: &str) -> RepoResult<()>;

    async fn mark_offline(&self, user_id: Snowflake, node_id: &str) -> RepoResult<()>;

    /// Connected on at least one node
    async fn is_online(&self, user_id: Snowflake) -> RepoResult<bool>;

    /// The subset of `user_ids` not connected anywhere
    async fn offline_among(&self, user_ids: &[Snowflake]) -> RepoResult<Vec<Snowflake>> {
        let mut offline = Vec::new();
        for &user_id in user_ids {
            if !self.is_online(user_id).await? {
                offline.push(user_id);
            }
        }
        Ok(offline)
    }
}

// ============================================================================
// Publish transport
// ============================================================================

/// Durable record of prepared-but-unpublished events.
///
/// An entry stays in the log until its event has been published or its
/// write is known to have rolled back. Publishing happens under a lease, so
/// a publisher that dies mid-flight leaves the entry for the reconciler.
#[async_trait]
pub trait HalfMessageLog: Send + Sync {
    /// Record (or restore) a half message
    async fn prepare(&self, half: &HalfMessage) -> RepoResult<()>;

    /// Take the publishing lease for an entry.
    ///
    /// True only if the entry exists and no lease taken at or after
    /// `expired_before` is held on it. The winner records a fresh lease.
    async fn claim(
        &self,
        message_id: Snowflake,
        expired_before: DateTime<Utc>,
    ) -> RepoResult<bool>;

    /// Give up a lease, keeping the entry for another attempt
    async fn release(&self, message_id: Snowflake) -> RepoResult<()>;

    /// Remove the entry and its lease; true if an entry was removed
    async fn complete(&self, message_id: Snowflake) -> RepoResult<bool>;

    /// Half messages prepared before `cutoff`, leased or not
    async fn stale(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<HalfMessage>>;
}

/// Broadcast transport to every gateway node
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Returns how many receivers the transport reached, or 1 for a durable
    /// append whose readers are not known yet
    async fn publish(&self, event: &MessageCommittedEvent) -> RepoResult<u32>;
}
