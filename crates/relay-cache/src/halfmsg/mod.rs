//! Durable log of prepared-but-unpublished events

mod half_message_log;

pub use half_message_log::{RedisHalfMessageLog, DEFAULT_HALF_MESSAGE_KEY};
