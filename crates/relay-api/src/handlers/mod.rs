//! HTTP request handlers
//!
//! Handlers parse the request, call one service, and shape the response.

pub mod channels;
pub mod health;
pub mod messages;
pub mod users;
