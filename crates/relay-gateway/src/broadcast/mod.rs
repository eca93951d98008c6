//! Cross-node event delivery
//!
//! Consumes the committed-message broadcast and pushes to local sessions.

mod router;

pub use router::{DeliveryRouter, RouteReport};
