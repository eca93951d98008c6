//! User handlers

use axum::{
    extract::{Query, State},
    Json,
};
use relay_service::{
    ChannelResponse, ChannelService, InboxEntryResponse, LimitParams, MentionParams,
    MessageResponse, MessageService,
};

use crate::extractors::AuthUser;
use crate::response::ApiResult;
use crate::state::AppState;

/// Inbox of the caller, newest first
///
/// GET /users/@me/inbox?limit=
pub async fn get_inbox(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Vec<InboxEntryResponse>>> {
    let entries = MessageService::new(state.service_context())
        .inbox(auth.user_id, params.limit_or(50))
        .await?;
    Ok(Json(entries))
}

/// Messages mentioning the caller, newest first
///
/// GET /users/@me/mentions?before=&limit=
pub async fn get_mentions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<MentionParams>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let messages = MessageService::new(state.service_context())
        .mentions(auth.user_id, params)
        .await?;
    Ok(Json(messages))
}

/// Channels of the caller, most recently active first
///
/// GET /users/@me/channels
pub async fn get_channels(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<ChannelResponse>>> {
    let channels = ChannelService::new(state.service_context())
        .user_channels(auth.user_id)
        .await?;
    Ok(Json(channels))
}
