//! Ports implemented by the infrastructure crates

mod collaborators;
mod repositories;

pub use collaborators::{
    EventPublisher, HalfMessageLog, MembershipDirectory, ModerationPolicy, ModerationVerdict,
    PresenceDirectory,
};
pub use repositories::{
    ChannelRepository, InboxRepository, MessageRepository, OfflineQueueRepository,
    ReactionRepository, ReadReceiptRepository, RepoResult, SequenceRepository, SyncQuery,
};
