//! Entity to model mappers
//!
//! This module provides conversions between domain entities (relay-core) and database models.
//! - `From<Model> for Entity`: Convert database rows to domain objects
//! - `*Insert` structs and `InboxBatch`: Prepare entity data for database writes

mod channel;
mod message;

pub use channel::ChannelInsert;
pub use message::{ids_to_i64, InboxBatch, MessageInsert};
