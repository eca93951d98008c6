//! Redis Stream event bus.
//!
//! Publishers append committed-message events to one stream and every
//! gateway node reads all of it from its own cursor, so every node sees
//! every event.

mod publisher;
mod subscriber;

/// Stream entry field holding the event JSON
pub(crate) const EVENT_FIELD: &str = "event";

pub use publisher::RedisEventPublisher;
pub use subscriber::{
    parse_event, EventSubscriber, SubscriberConfig, SubscriberError, SubscriberResult,
};
