//! Integration test utilities for the relay engine
//!
//! In-memory backends and a harness for end-to-end engine scenarios, a
//! loopback WebSocket gateway over that harness, and helpers for running the
//! REST API against real Postgres and Redis.

pub mod helpers;
pub mod memory;

pub use fixtures::*;
pub use gateway::*;
pub use harness::*;
pub use helpers::*;
pub use memory::*;
