//! # relay-gateway
//!
//! WebSocket gateway node. Holds live client sessions, routes committed
//! message events to them, replays the offline queue on connect and hosts
//! the half-message reconciler.

pub mod broadcast;
pub mod connection;
pub mod handlers;
pub mod protocol;
pub mod server;

pub use server::{create_app, run, GatewayState};
