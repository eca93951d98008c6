//! Domain entities - core business objects

mod channel;
mod content;
mod inbox;
mod member;
mod message;
mod offline;
mod reaction;
mod recall;
mod receipt;

pub use channel::{private_pair, Channel, ChannelStatus, ChannelType};
pub use content::{MessageContent, MessageType, MAX_TEXT_LENGTH, PREVIEW_LENGTH};
pub use inbox::InboxEntry;
pub use member::{ChannelMember, MemberRole};
pub use message::{Message, MessageStatus};
pub use offline::{NewOfflineEntry, OfflineQueueEntry, DEFAULT_PRIORITY, MENTION_PRIORITY};
pub use reaction::{normalize_emoji, Reaction, MAX_EMOJI_LENGTH};
pub use recall::{RecallRecord, MAX_RECALL_REASON_LENGTH};
pub use receipt::ReadReceipt;
