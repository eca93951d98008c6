//! Control frame handlers

mod error;
mod heartbeat;
mod identify;
pub mod offline;
mod offline_ack;

pub use error::{HandlerError, HandlerResult};
pub use heartbeat::HeartbeatHandler;
pub use identify::IdentifyHandler;
pub use offline::SessionSink;
pub use offline_ack::OfflineAckHandler;

use crate::connection::{Connection, SessionGuard};
use crate::protocol::{GatewayMessage, OpCode};
use crate::server::GatewayState;
use relay_core::Snowflake;
use std::sync::Arc;

/// Routes client control frames to their handlers
pub struct MessageDispatcher;

impl MessageDispatcher {
    /// Handle one control frame. `session` holds the registration once the
    /// connection has identified.
    pub async fn dispatch(
        state: &GatewayState,
        connection: &Arc<Connection>,
        session: &mut Option<SessionGuard>,
        message: GatewayMessage,
    ) -> HandlerResult<()> {
        if !message.op.is_client_op() {
            tracing::warn!(
                session_id = %connection.session_id(),
                op = %message.op,
                "Received server-only op code from client"
            );
            return Err(HandlerError::UnexpectedOp(message.op));
        }

        match message.op {
            OpCode::Identify => {
                if session.is_some() {
                    return Err(HandlerError::AlreadyAuthenticated);
                }
                let payload = message.as_identify().ok_or_else(|| {
                    HandlerError::InvalidPayload("Invalid Identify payload".to_string())
                })?;

                let guard = IdentifyHandler::handle(state, connection, payload).await?;
                Self::spawn_offline_drain(state, connection, guard.user_id());
                *session = Some(guard);
                Ok(())
            }
            OpCode::Heartbeat => HeartbeatHandler::handle(state, connection, session.as_ref()).await,
            OpCode::OfflineAck => {
                let payload = message.as_offline_ack().ok_or_else(|| {
                    HandlerError::InvalidPayload("Invalid OfflineAck payload".to_string())
                })?;
                OfflineAckHandler::handle(state, connection, session.as_ref(), payload).await
            }
            op => Err(HandlerError::UnexpectedOp(op)),
        }
    }

    fn spawn_offline_drain(state: &GatewayState, connection: &Arc<Connection>, user_id: Snowflake) {
        let ctx = state.service_context().clone();
        let connection = Arc::clone(connection);
        tokio::spawn(async move {
            match offline::drain_to(&ctx, user_id, connection).await {
                Ok(report) if report.pushed > 0 => {
                    tracing::debug!(user_id = %user_id, pushed = report.pushed, "Offline backlog replayed");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Offline drain failed"),
            }
        });
    }
}
