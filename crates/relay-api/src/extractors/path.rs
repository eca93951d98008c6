//! Path parameter extractors
//!
//! Snowflake IDs arrive as strings in the path and are parsed here so
//! handlers receive typed ids or a 400.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use relay_core::Snowflake;
use serde::Deserialize;

use crate::response::ApiError;

fn parse_id(raw: &str, name: &str) -> Result<Snowflake, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::invalid_path(format!("Invalid {name} format")))
}

async fn raw_path<T, S>(parts: &mut Parts, state: &S) -> Result<T, ApiError>
where
    T: for<'de> Deserialize<'de> + Send,
    S: Send + Sync,
{
    let Path(inner) = Path::<T>::from_request_parts(parts, state)
        .await
        .map_err(|e| ApiError::invalid_path(e.to_string()))?;
    Ok(inner)
}

/// `/channels/:channel_id`
#[derive(Debug, Clone, Copy)]
pub struct ChannelIdPath {
    pub channel_id: Snowflake,
}

#[derive(Deserialize)]
struct RawChannel {
    channel_id: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ChannelIdPath {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw: RawChannel = raw_path(parts, state).await?;
        Ok(Self {
            channel_id: parse_id(&raw.channel_id, "channel_id")?,
        })
    }
}

/// `/channels/:channel_id/messages/:message_id`
#[derive(Debug, Clone, Copy)]
pub struct ChannelMessagePath {
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
}

#[derive(Deserialize)]
struct RawChannelMessage {
    channel_id: String,
    message_id: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ChannelMessagePath {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw: RawChannelMessage = raw_path(parts, state).await?;
        Ok(Self {
            channel_id: parse_id(&raw.channel_id, "channel_id")?,
            message_id: parse_id(&raw.message_id, "message_id")?,
        })
    }
}

/// `/channels/:channel_id/members/:user_id`
#[derive(Debug, Clone, Copy)]
pub struct ChannelMemberPath {
    pub channel_id: Snowflake,
    pub user_id: Snowflake,
}

#[derive(Deserialize)]
struct RawChannelMember {
    channel_id: String,
    user_id: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ChannelMemberPath {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw: RawChannelMember = raw_path(parts, state).await?;
        Ok(Self {
            channel_id: parse_id(&raw.channel_id, "channel_id")?,
            user_id: parse_id(&raw.user_id, "user_id")?,
        })
    }
}

/// `/channels/private/:user_id`
#[derive(Debug, Clone, Copy)]
pub struct UserIdPath {
    pub user_id: Snowflake,
}

#[derive(Deserialize)]
struct RawUser {
    user_id: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserIdPath {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw: RawUser = raw_path(parts, state).await?;
        Ok(Self {
            user_id: parse_id(&raw.user_id, "user_id")?,
        })
    }
}
