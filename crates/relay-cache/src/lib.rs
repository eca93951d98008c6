//! # relay-cache
//!
//! Redis layer for cross-node delivery plumbing.
//!
//! ## Features
//!
//! - **Connection Pool**: Managed Redis connection pool with deadpool
//! - **Event Bus**: Committed-message events on a Redis Stream, read by every node from its own cursor
//! - **Presence**: Which users are connected on any gateway node
//! - **Half-Message Log**: Prepared events awaiting their commit decision
//!
//! ## Example
//!
//! ```ignore
//! use relay_cache::{EventSubscriber, RedisEventPublisher, RedisPool, SubscriberConfig};
//!
//! let pool = RedisPool::from_config(&config.redis)?;
//! let publisher = RedisEventPublisher::new(pool.clone(), "relay:events");
//!
//! let subscriber = EventSubscriber::start(SubscriberConfig {
//!     redis_url: pool.url().to_string(),
//!     node_id: "gateway-1".to_string(),
//!     ..SubscriberConfig::default()
//! });
//! let mut events = subscriber.receiver();
//! ```

pub mod halfmsg;
pub mod pool;
pub mod presence;
pub mod pubsub;

pub use halfmsg::{RedisHalfMessageLog, DEFAULT_HALF_MESSAGE_KEY};
pub use pool::{RedisPool, RedisPoolError, RedisResult};
pub use presence::{RedisPresenceDirectory, DEFAULT_PRESENCE_TTL_SECS};
pub use pubsub::{
    parse_event, EventSubscriber, RedisEventPublisher, SubscriberConfig, SubscriberError,
    SubscriberResult,
};
