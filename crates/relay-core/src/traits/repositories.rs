//! Repository traits (ports) - storage owned by the delivery engine
//!
//! The domain layer defines what it needs, and the infrastructure layer
//! provides the implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    Channel, ChannelMember, InboxEntry, MemberRole, Message, MessageStatus, NewOfflineEntry,
    OfflineQueueEntry, Reaction, ReadReceipt, RecallRecord,
};
use crate::error::DomainError;
use crate::value_objects::Snowflake;

/// Result type for repository operations
pub type RepoResult<T> = Result<T, DomainError>;

// ============================================================================
// Sequence Repository
// ============================================================================

#[async_trait]
pub trait SequenceRepository: Send + Sync {
    /// Atomically increment and return the channel's counter.
    ///
    /// Concurrent callers for one channel never receive equal values and the
    /// counter never decreases. The first call for a channel returns 1.
    async fn next_seq(&self, channel_id: Snowflake) -> RepoResult<i64>;

    /// Current counter value without incrementing (0 if never used)
    async fn current_seq(&self, channel_id: Snowflake) -> RepoResult<i64>;

    /// Raise the counter to the highest seq already persisted in the
    /// timeline, returning the resulting value
    async fn resync(&self, channel_id: Snowflake) -> RepoResult<i64>;
}

// ============================================================================
// Message (Timeline) Repository
// ============================================================================

/// Cursor query for sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncQuery {
    /// Return messages with `seq_id > cursor`
    pub cursor: i64,
    pub limit: i64,
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert the timeline row and its inbox rows in one transaction, and
    /// bump unread counters of every other active member.
    ///
    /// Either everything is durable afterwards or nothing is.
    async fn insert_with_inbox(&self, message: &Message, inbox: &[InboxEntry]) -> RepoResult<()>;

    /// Whether the timeline holds `message_id`
    async fn exists(&self, message_id: Snowflake) -> RepoResult<bool>;

    /// Find message by ID
    async fn find_by_id(&self, message_id: Snowflake) -> RepoResult<Option<Message>>;

    /// Fetch several messages; missing ids are skipped
    async fn find_by_ids(&self, message_ids: &[Snowflake]) -> RepoResult<Vec<Message>>;

    /// Messages after the cursor, ascending by seq_id
    async fn sync(&self, channel_id: Snowflake, query: SyncQuery) -> RepoResult<Vec<Message>>;

    /// Compare-and-set the status; returns false if the row was not in `from`
    async fn update_status(
        &self,
        message_id: Snowflake,
        from: MessageStatus,
        to: MessageStatus,
    ) -> RepoResult<bool>;

    /// NORMAL to RECALLED plus the audit row, in one transaction. False
    /// (and nothing written) if the message was not NORMAL.
    async fn recall(&self, record: &RecallRecord) -> RepoResult<bool>;

    /// Audit record of a recalled message
    async fn find_recall(&self, message_id: Snowflake) -> RepoResult<Option<RecallRecord>>;

    /// NORMAL messages naming `user_id` in their mentions, newest first,
    /// with ids below `before` when given
    async fn mentioning(
        &self,
        user_id: Snowflake,
        before: Option<Snowflake>,
        limit: i64,
    ) -> RepoResult<Vec<Message>>;
}

// ============================================================================
// Inbox Repository
// ============================================================================

#[async_trait]
pub trait InboxRepository: Send + Sync {
    /// Newest-first inbox of a user
    async fn list_for_user(&self, user_id: Snowflake, limit: i64) -> RepoResult<Vec<InboxEntry>>;

    /// Inbox rows written for a message (all recipients)
    async fn find_by_message(&self, message_id: Snowflake) -> RepoResult<Vec<InboxEntry>>;
}

// ============================================================================
// Offline Queue Repository
// ============================================================================

#[async_trait]
pub trait OfflineQueueRepository: Send + Sync {
    /// Record a new undelivered entry (retry_count 0, due immediately)
    async fn enqueue(&self, entry: &NewOfflineEntry) -> RepoResult<OfflineQueueEntry>;

    /// Due entries of a user ordered by priority desc, then insertion order
    async fn pending_for_user(
        &self,
        user_id: Snowflake,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepoResult<Vec<OfflineQueueEntry>>;

    /// Set delivered and delivered_at on an undelivered entry of `user_id`;
    /// false if no such entry exists
    async fn mark_delivered(&self, entry_id: i64, user_id: Snowflake) -> RepoResult<bool>;

    /// Count one push attempt (failed, or sent and not yet acknowledged):
    /// increment retry_count and store the next attempt time (`None` once
    /// retries are exhausted)
    async fn record_attempt(
        &self,
        entry_id: i64,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> RepoResult<()>;

    /// Every entry of a user, delivered or not, for inspection
    async fn find_by_user(&self, user_id: Snowflake) -> RepoResult<Vec<OfflineQueueEntry>>;
}

// ============================================================================
// Read Receipt Repository
// ============================================================================

#[async_trait]
pub trait ReadReceiptRepository: Send + Sync {
    /// Insert-or-ignore the receipt, then reset the reader's unread count to
    /// 0, set last_read_seq to `seq_id`, and flag the inbox row read.
    ///
    /// Returns whether a new receipt row was created.
    async fn mark_as_read(&self, receipt: &ReadReceipt, seq_id: i64) -> RepoResult<bool>;

    /// Number of distinct readers of a message
    async fn count_reads(&self, message_id: Snowflake) -> RepoResult<i64>;

    /// Reader ids, most recent read first
    async fn list_readers(&self, message_id: Snowflake, limit: i64) -> RepoResult<Vec<Snowflake>>;
}

// ============================================================================
// Reaction Repository
// ============================================================================

#[async_trait]
pub trait ReactionRepository: Send + Sync {
    /// Insert-or-ignore; returns whether a new row was created
    async fn add(&self, reaction: &Reaction) -> RepoResult<bool>;

    /// Returns whether a row was removed
    async fn remove(&self, message_id: Snowflake, user_id: Snowflake, emoji: &str)
        -> RepoResult<bool>;

    /// Reactions of a message, oldest first
    async fn list_for_message(&self, message_id: Snowflake) -> RepoResult<Vec<Reaction>>;
}

// ============================================================================
// Channel Repository (membership writes)
// ============================================================================

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Create a channel with its owner as first member
    async fn create(&self, channel: &Channel, owner: &ChannelMember) -> RepoResult<()>;

    /// Add or re-activate a member and bump member_count in one transaction.
    ///
    /// Fails with `AlreadyMember` or `ChannelFull`.
    async fn add_member(&self, member: &ChannelMember) -> RepoResult<()>;

    /// Soft-leave a member and decrement member_count in one transaction
    async fn remove_member(&self, channel_id: Snowflake, user_id: Snowflake) -> RepoResult<()>;

    /// Create the private channel of two users, or return the one that
    /// already exists for the pair. At most one private channel exists per
    /// unordered pair, even under concurrent calls.
    async fn create_private(
        &self,
        channel: &Channel,
        members: &[ChannelMember; 2],
    ) -> RepoResult<Channel>;

    /// Change the role of an active member; `MemberNotFound` otherwise
    async fn set_role(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
        role: MemberRole,
    ) -> RepoResult<()>;
}
