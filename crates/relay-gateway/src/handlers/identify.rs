//! IDENTIFY handler

use super::{HandlerError, HandlerResult};
use crate::connection::{Connection, SessionGuard};
use crate::protocol::{GatewayMessage, IdentifyPayload, ReadyPayload};
use crate::server::GatewayState;
use std::sync::Arc;

pub struct IdentifyHandler;

impl IdentifyHandler {
    /// Authenticate the token, register the session on this node and send
    /// READY. The caller keeps the returned guard for the socket lifetime.
    pub async fn handle(
        state: &GatewayState,
        connection: &Arc<Connection>,
        payload: IdentifyPayload,
    ) -> HandlerResult<SessionGuard> {
        let user_id = state
            .jwt()
            .authenticate(payload.bare_token())
            .map_err(|e| {
                tracing::debug!(error = %e, "Token validation failed");
                HandlerError::AuthenticationFailed(e.to_string())
            })?;

        let guard = state.registry().register(user_id, Arc::clone(connection)).await;

        let ready = ReadyPayload {
            session_id: connection.session_id().to_string(),
            user_id,
            node_id: state.registry().node_id().to_string(),
        };
        connection
            .send(GatewayMessage::ready(&ready))
            .await
            .map_err(|e| HandlerError::Internal(format!("Failed to send READY: {e}")))?;

        tracing::info!(
            session_id = %connection.session_id(),
            user_id = %user_id,
            "Client identified"
        );

        Ok(guard)
    }
}
