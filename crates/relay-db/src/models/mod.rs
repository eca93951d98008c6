//! Database models - SQLx-compatible structs for PostgreSQL tables

mod channel;
mod message;
mod offline;

pub use channel::{ChannelMemberModel, ChannelModel};
pub use message::{InboxModel, MessageModel, ReactionModel, RecallModel};
pub use offline::OfflineEntryModel;
