//! Delivery events - what the publish layer hands to every gateway node

mod message_event;

pub use message_event::{HalfMessage, MessageCommittedEvent};
