//! Route definitions
//!
//! All API routes organized by domain and mounted under /api/v1.

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::{channels, health, messages, users};
use crate::state::AppState;

/// Create the main API router (health routes are mounted separately so they
/// bypass rate limiting)
pub fn create_router() -> Router<AppState> {
    Router::new().nest("/api/v1", api_v1_routes())
}

/// Health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
}

/// API v1 routes
fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(user_routes())
        .merge(channel_routes())
        .merge(message_routes())
}

/// User routes
fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/@me/inbox", get(users::get_inbox))
        .route("/users/@me/mentions", get(users::get_mentions))
        .route("/users/@me/channels", get(users::get_channels))
}

/// Channel and membership routes
fn channel_routes() -> Router<AppState> {
    Router::new()
        .route("/channels", post(channels::create_channel))
        .route(
            "/channels/private/:user_id",
            post(channels::open_private_channel),
        )
        .route("/channels/:channel_id", get(channels::get_channel))
        .route("/channels/:channel_id/members", get(channels::list_members))
        .route(
            "/channels/:channel_id/members/:user_id",
            put(channels::add_member).delete(channels::remove_member),
        )
        .route(
            "/channels/:channel_id/admins/:user_id",
            put(channels::set_admin),
        )
}

/// Message routes
fn message_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/channels/:channel_id/messages",
            get(messages::sync_messages).post(messages::submit_message),
        )
        .route(
            "/channels/:channel_id/messages/:message_id",
            get(messages::get_message),
        )
        .route(
            "/channels/:channel_id/messages/:message_id/read",
            post(messages::mark_read),
        )
        .route(
            "/channels/:channel_id/messages/:message_id/reads",
            get(messages::get_reads),
        )
        .route(
            "/channels/:channel_id/messages/:message_id/recall",
            get(messages::get_recall).post(messages::recall_message),
        )
        .route(
            "/channels/:channel_id/messages/:message_id/reactions",
            get(messages::list_reactions)
                .put(messages::add_reaction)
                .delete(messages::remove_reaction),
        )
        .route(
            "/channels/:channel_id/messages/:message_id/review",
            post(messages::review_message),
        )
}
