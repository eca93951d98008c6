//! Message handlers
//!
//! Ingestion, sync, read acknowledgements, read aggregates, recall, review
//! resolution, and reactions.

use axum::{
    extract::{Query, State},
    Json,
};
use relay_service::{
    LimitParams, MessageResponse, MessageService, ReactionParams, ReactionResponse,
    ReactionService, ReadStateService, ReadsResponse, RecallRecordResponse, RecallRequest,
    ReviewDecisionRequest, SubmitMessageRequest, SubmitMessageResponse, SyncParams, SyncResponse,
};
use validator::Validate;

use crate::extractors::{AuthUser, ChannelIdPath, ChannelMessagePath, ValidatedJson};
use crate::response::{ApiResult, Created, NoContent};
use crate::state::AppState;

/// Submit a message; returns once the local write committed
///
/// POST /channels/{channel_id}/messages
pub async fn submit_message(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelIdPath,
    ValidatedJson(request): ValidatedJson<SubmitMessageRequest>,
) -> ApiResult<Created<Json<SubmitMessageResponse>>> {
    let service = MessageService::new(state.service_context());
    let response = service
        .submit(path.channel_id, auth.user_id, request)
        .await?;
    Ok(Created(Json(response)))
}

/// Messages after a seq cursor, ascending
///
/// GET /channels/{channel_id}/messages?cursor=&limit=
pub async fn sync_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelIdPath,
    Query(params): Query<SyncParams>,
) -> ApiResult<Json<SyncResponse>> {
    let service = MessageService::new(state.service_context());
    let response = service.sync(path.channel_id, auth.user_id, params).await?;
    Ok(Json(response))
}

/// Get message by ID
///
/// GET /channels/{channel_id}/messages/{message_id}
pub async fn get_message(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelMessagePath,
) -> ApiResult<Json<MessageResponse>> {
    let service = MessageService::new(state.service_context());
    let response = service
        .get_message(path.channel_id, path.message_id, auth.user_id)
        .await?;
    Ok(Json(response))
}

/// Acknowledge a read (idempotent)
///
/// POST /channels/{channel_id}/messages/{message_id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelMessagePath,
) -> ApiResult<NoContent> {
    ReadStateService::new(state.service_context())
        .mark_as_read(path.channel_id, path.message_id, auth.user_id)
        .await?;
    Ok(NoContent)
}

/// Read count and most recent readers
///
/// GET /channels/{channel_id}/messages/{message_id}/reads?limit=
pub async fn get_reads(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelMessagePath,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<ReadsResponse>> {
    let response = ReadStateService::new(state.service_context())
        .reads(
            path.channel_id,
            path.message_id,
            auth.user_id,
            params.limit_or(50),
        )
        .await?;
    Ok(Json(response))
}

/// Recall a message (body optional, `{"reason": ...}`)
///
/// POST /channels/{channel_id}/messages/{message_id}/recall
pub async fn recall_message(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelMessagePath,
    request: Option<Json<RecallRequest>>,
) -> ApiResult<NoContent> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;
    MessageService::new(state.service_context())
        .recall(path.channel_id, path.message_id, auth.user_id, request.reason)
        .await?;
    Ok(NoContent)
}

/// Recall audit record; sender and moderators only
///
/// GET /channels/{channel_id}/messages/{message_id}/recall
pub async fn get_recall(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelMessagePath,
) -> ApiResult<Json<RecallRecordResponse>> {
    let record = MessageService::new(state.service_context())
        .recall_record(path.channel_id, path.message_id, auth.user_id)
        .await?;
    Ok(Json(record))
}

/// Reactions on a message, oldest first
///
/// GET /channels/{channel_id}/messages/{message_id}/reactions
pub async fn list_reactions(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelMessagePath,
) -> ApiResult<Json<Vec<ReactionResponse>>> {
    let reactions = ReactionService::new(state.service_context())
        .list(path.channel_id, path.message_id, auth.user_id)
        .await?;
    Ok(Json(reactions))
}

/// React; repeating a reaction is a no-op
///
/// PUT /channels/{channel_id}/messages/{message_id}/reactions?emoji=
pub async fn add_reaction(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelMessagePath,
    Query(params): Query<ReactionParams>,
) -> ApiResult<NoContent> {
    ReactionService::new(state.service_context())
        .add(path.channel_id, path.message_id, auth.user_id, &params.emoji)
        .await?;
    Ok(NoContent)
}

/// Withdraw a reaction
///
/// DELETE /channels/{channel_id}/messages/{message_id}/reactions?emoji=
pub async fn remove_reaction(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelMessagePath,
    Query(params): Query<ReactionParams>,
) -> ApiResult<NoContent> {
    ReactionService::new(state.service_context())
        .remove(path.channel_id, path.message_id, auth.user_id, &params.emoji)
        .await?;
    Ok(NoContent)
}

/// Approve or reject a message held for review
///
/// POST /channels/{channel_id}/messages/{message_id}/review
pub async fn review_message(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelMessagePath,
    Json(request): Json<ReviewDecisionRequest>,
) -> ApiResult<NoContent> {
    MessageService::new(state.service_context())
        .resolve_review(path.channel_id, path.message_id, auth.user_id, request.approve)
        .await?;
    Ok(NoContent)
}
