//! Connection management
//!
//! Live WebSocket connections and the per-node session registry.

mod connection;
mod registry;

pub use connection::{Connection, ConnectionState, Outbound};
pub use registry::{SessionGuard, SessionRegistry};
