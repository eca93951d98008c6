//! User presence across gateway nodes

mod node_presence;

pub use node_presence::{RedisPresenceDirectory, DEFAULT_PRESENCE_TTL_SECS};
