//! Repository implementations
//!
//! PostgreSQL implementations of the repository and membership traits
//! defined in relay-core.

mod channel;
mod error;
mod inbox;
mod message;
mod offline;
mod reaction;
mod receipt;
mod sequence;

pub use channel::PgChannelRepository;
pub use inbox::PgInboxRepository;
pub use message::PgMessageRepository;
pub use offline::PgOfflineQueueRepository;
pub use reaction::PgReactionRepository;
pub use receipt::PgReadReceiptRepository;
pub use sequence::PgSequenceRepository;
