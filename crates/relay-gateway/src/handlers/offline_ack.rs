//! OFFLINE_ACK handler

use super::{HandlerError, HandlerResult};
use crate::connection::{Connection, SessionGuard};
use crate::protocol::OfflineAckPayload;
use crate::server::GatewayState;
use relay_service::OfflineQueueService;
use std::sync::Arc;

pub struct OfflineAckHandler;

impl OfflineAckHandler {
    /// Mark the acknowledged entry delivered. Acks for entries that are not
    /// pending are ignored so a client can safely repeat them.
    pub async fn handle(
        state: &GatewayState,
        connection: &Arc<Connection>,
        session: Option<&SessionGuard>,
        payload: OfflineAckPayload,
    ) -> HandlerResult<()> {
        let session = session.ok_or(HandlerError::NotAuthenticated)?;

        let acked = OfflineQueueService::new(state.service_context())
            .acknowledge(session.user_id(), payload.entry_id)
            .await?;

        tracing::debug!(
            session_id = %connection.session_id(),
            entry_id = payload.entry_id,
            acked,
            "Offline ack received"
        );
        Ok(())
    }
}
