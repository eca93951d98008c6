//! Caller identity
//!
//! Authentication itself lives outside this system; callers present an
//! HS256 token whose subject is their user id.

mod jwt;

pub use jwt::{Claims, JwtVerifier};
