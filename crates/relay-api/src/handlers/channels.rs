//! Channel handlers
//!
//! Channel creation, private channels, and membership.

use axum::{extract::State, Json};
use relay_service::{
    AddMemberRequest, ChannelResponse, ChannelService, CreateChannelRequest, MemberResponse,
    SetAdminRequest,
};

use crate::extractors::{AuthUser, ChannelIdPath, ChannelMemberPath, UserIdPath, ValidatedJson};
use crate::response::{ApiResult, Created, NoContent};
use crate::state::AppState;

/// Create channel; the caller becomes its owner
///
/// POST /channels
pub async fn create_channel(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateChannelRequest>,
) -> ApiResult<Created<Json<ChannelResponse>>> {
    let response = ChannelService::new(state.service_context())
        .create_channel(auth.user_id, request)
        .await?;
    Ok(Created(Json(response)))
}

/// Get channel by ID
///
/// GET /channels/{channel_id}
pub async fn get_channel(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelIdPath,
) -> ApiResult<Json<ChannelResponse>> {
    let response = ChannelService::new(state.service_context())
        .get_channel(path.channel_id, auth.user_id)
        .await?;
    Ok(Json(response))
}

/// Add a member (body optional, defaults to MEMBER)
///
/// PUT /channels/{channel_id}/members/{user_id}
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelMemberPath,
    request: Option<Json<AddMemberRequest>>,
) -> ApiResult<Created<Json<MemberResponse>>> {
    let role = request.map(|Json(r)| r.role).unwrap_or_default();
    let response = ChannelService::new(state.service_context())
        .add_member(path.channel_id, auth.user_id, path.user_id, role)
        .await?;
    Ok(Created(Json(response)))
}

/// Remove a member, or leave when `user_id` is the caller
///
/// DELETE /channels/{channel_id}/members/{user_id}
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelMemberPath,
) -> ApiResult<NoContent> {
    ChannelService::new(state.service_context())
        .remove_member(path.channel_id, auth.user_id, path.user_id)
        .await?;
    Ok(NoContent)
}

/// Private channel with another user, created on first use
///
/// POST /channels/private/{user_id}
pub async fn open_private_channel(
    State(state): State<AppState>,
    auth: AuthUser,
    path: UserIdPath,
) -> ApiResult<Json<ChannelResponse>> {
    let response = ChannelService::new(state.service_context())
        .get_or_create_private(auth.user_id, path.user_id)
        .await?;
    Ok(Json(response))
}

/// Active members
///
/// GET /channels/{channel_id}/members
pub async fn list_members(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelIdPath,
) -> ApiResult<Json<Vec<MemberResponse>>> {
    let members = ChannelService::new(state.service_context())
        .list_members(path.channel_id, auth.user_id)
        .await?;
    Ok(Json(members))
}

/// Grant or revoke ADMIN; owner only
///
/// PUT /channels/{channel_id}/admins/{user_id}
pub async fn set_admin(
    State(state): State<AppState>,
    auth: AuthUser,
    path: ChannelMemberPath,
    Json(request): Json<SetAdminRequest>,
) -> ApiResult<Json<MemberResponse>> {
    let member = ChannelService::new(state.service_context())
        .set_admin(path.channel_id, auth.user_id, path.user_id, request.is_admin)
        .await?;
    Ok(Json(member))
}
