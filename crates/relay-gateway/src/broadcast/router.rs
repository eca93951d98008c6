//! Delivery router
//!
//! Every node sees every committed event. The router pushes each event to
//! the recipients that hold a session on this node and ignores the rest;
//! other nodes and the offline queue cover them.

use crate::connection::SessionRegistry;
use crate::protocol::{PushCommand, PushMessage, PushPacket};
use relay_core::{MessageCommittedEvent, Snowflake};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// What one event did on this node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteReport {
    /// MSG_PUSH frames queued to local recipients
    pub pushed: usize,
    /// Recipients with no session on this node
    pub absent: usize,
    /// Pushes dropped because the session queue was full or closed
    pub dropped: usize,
    /// The sender has a session here and got its MSG_ACK
    pub acked: bool,
}

#[derive(Debug, Clone)]
pub struct DeliveryRouter {
    registry: Arc<SessionRegistry>,
}

impl DeliveryRouter {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Route one event to local sessions without waiting on any socket
    pub fn route(&self, event: &MessageCommittedEvent) -> RouteReport {
        let mut report = RouteReport::default();
        let body = PushMessage::from_event(event);

        for &recipient in event.recipients() {
            if recipient == event.sender_id {
                continue;
            }
            if self.offer(recipient, PushCommand::MsgPush, &body) {
                report.pushed += 1;
            } else if self.registry.lookup(recipient).is_some() {
                report.dropped += 1;
            } else {
                report.absent += 1;
            }
        }

        report.acked = self.offer(event.sender_id, PushCommand::MsgAck, &body);

        tracing::trace!(
            message_id = %event.message_id,
            channel_id = %event.channel_id,
            mode = ?event.fanout_mode(),
            pushed = report.pushed,
            absent = report.absent,
            dropped = report.dropped,
            "Event routed"
        );
        report
    }

    fn offer(&self, user_id: Snowflake, command: PushCommand, body: &PushMessage) -> bool {
        let Some(connection) = self.registry.lookup(user_id) else {
            return false;
        };

        match connection.try_push(PushPacket::new(command, body.clone())) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // The client catches up through sync
                tracing::warn!(
                    user_id = %user_id,
                    session_id = %connection.session_id(),
                    "Session queue full, push dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Route events until the subscription closes or shutdown is signalled
    pub async fn run(
        self,
        mut events: broadcast::Receiver<MessageCommittedEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!(node_id = %self.registry.node_id(), "Delivery router started");

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        self.route(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Delivery router lagged, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event subscription closed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Delivery router stopped");
    }
}
