//! # relay-core
//!
//! Domain layer of the fan-out and delivery engine: identifiers, the message
//! model, fan-out and transaction-state value objects, delivery events, and
//! the repository and collaborator traits implemented by the infrastructure
//! crates. No database, cache, or web framework code lives here.

pub mod entities;
pub mod error;
pub mod events;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    Channel, ChannelMember, ChannelStatus, ChannelType, InboxEntry, MemberRole, Message,
    MessageContent, MessageStatus, MessageType, NewOfflineEntry, OfflineQueueEntry, Reaction,
    ReadReceipt, RecallRecord, DEFAULT_PRIORITY, MENTION_PRIORITY,
};
pub use error::DomainError;
pub use events::{HalfMessage, MessageCommittedEvent};
pub use traits::{
    ChannelRepository, EventPublisher, HalfMessageLog, InboxRepository, MembershipDirectory,
    MessageRepository, ModerationPolicy, ModerationVerdict, OfflineQueueRepository,
    PresenceDirectory, ReactionRepository, ReadReceiptRepository, RepoResult, SequenceRepository,
    SyncQuery,
};
pub use value_objects::{
    FanoutMode, LocalTxState, Resolution, RetryPolicy, Snowflake, SnowflakeGenerator,
    SnowflakeParseError, DEFAULT_READ_FANOUT_THRESHOLD,
};
