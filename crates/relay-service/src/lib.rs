//! # relay-service
//!
//! Application layer: the fan-out and delivery engine, the use-case
//! services on top of it, and the DTOs exchanged with the API.

pub mod dto;
pub mod services;

pub use dto::*;
pub use services::*;
