//! HEARTBEAT handler

use super::{HandlerError, HandlerResult};
use crate::connection::{Connection, SessionGuard};
use crate::protocol::GatewayMessage;
use crate::server::GatewayState;
use std::sync::Arc;

pub struct HeartbeatHandler;

impl HeartbeatHandler {
    /// Record the heartbeat, extend presence for identified sessions, ACK
    pub async fn handle(
        state: &GatewayState,
        connection: &Arc<Connection>,
        session: Option<&SessionGuard>,
    ) -> HandlerResult<()> {
        connection.record_heartbeat();

        if let Some(session) = session {
            state.registry().refresh_presence(session.user_id()).await;
        }

        tracing::trace!(session_id = %connection.session_id(), "Heartbeat received");

        connection
            .send(GatewayMessage::heartbeat_ack())
            .await
            .map_err(|_| HandlerError::Internal("Failed to send heartbeat ACK".to_string()))
    }
}
