//! Individual WebSocket connection
//!
//! The socket task owns the actual sink; everything else talks to the
//! connection through its bounded outbound queue.

use crate::protocol::{CloseCode, GatewayMessage, PushPacket};
use parking_lot::{Mutex, RwLock};
use relay_core::Snowflake;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// A frame queued for the socket writer
#[derive(Debug, Clone)]
pub enum Outbound {
    Control(GatewayMessage),
    Push(PushPacket),
    /// Close the socket with this code after flushing earlier frames
    Close(CloseCode),
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for IDENTIFY
    Connecting,
    /// Identified and registered
    Connected,
    Disconnected,
}

/// A single WebSocket connection
pub struct Connection {
    session_id: String,
    user_id: RwLock<Option<Snowflake>>,
    state: RwLock<ConnectionState>,
    sender: mpsc::Sender<Outbound>,
    last_heartbeat: Mutex<Instant>,
    created_at: Instant,
}

impl Connection {
    pub fn new(session_id: String, sender: mpsc::Sender<Outbound>) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            user_id: RwLock::new(None),
            state: RwLock::new(ConnectionState::Connecting),
            sender,
            last_heartbeat: Mutex::new(Instant::now()),
            created_at: Instant::now(),
        })
    }

    #[must_use]
    pub fn generate_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> Option<Snowflake> {
        *self.user_id.read()
    }

    /// Bind the connection to its identified user
    pub fn identify(&self, user_id: Snowflake) {
        *self.user_id.write() = Some(user_id);
        *self.state.write() = ConnectionState::Connected;
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.read().is_some()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    pub fn record_heartbeat(&self) {
        *self.last_heartbeat.lock() = Instant::now();
    }

    pub fn time_since_heartbeat(&self) -> Duration {
        self.last_heartbeat.lock().elapsed()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Queue a control frame, waiting for room in the queue
    pub async fn send(&self, message: GatewayMessage) -> Result<(), mpsc::error::SendError<Outbound>> {
        self.sender.send(Outbound::Control(message)).await
    }

    /// Queue a push, waiting for room in the queue
    pub async fn push(&self, packet: PushPacket) -> Result<(), mpsc::error::SendError<Outbound>> {
        self.sender.send(Outbound::Push(packet)).await
    }

    /// Queue a push without waiting (router path)
    pub fn try_push(&self, packet: PushPacket) -> Result<(), mpsc::error::TrySendError<Outbound>> {
        self.sender.try_send(Outbound::Push(packet))
    }

    /// Ask the socket writer to close the connection
    pub fn close(&self, code: CloseCode) {
        if self.sender.try_send(Outbound::Close(code)).is_err() {
            tracing::debug!(
                session_id = %self.session_id,
                close_code = %code,
                "Close request dropped, connection already closing"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id())
            .field("state", &self.state())
            .finish()
    }
}
