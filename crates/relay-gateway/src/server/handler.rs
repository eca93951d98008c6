//! WebSocket handler
//!
//! One task per socket reads client frames and watches the heartbeat; a
//! writer task drains the connection's outbound queue into the socket.

use crate::connection::{Connection, ConnectionState, Outbound, SessionGuard};
use crate::handlers::{HandlerError, MessageDispatcher};
use crate::protocol::{CloseCode, Encoding, GatewayMessage, HelloPayload};
use crate::server::GatewayState;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

/// Outbound frames buffered per connection before pushes are dropped
const OUTBOUND_BUFFER_SIZE: usize = 256;

/// How long the writer may take to flush a close frame
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub encoding: Encoding,
}

/// WebSocket gateway handler
pub async fn gateway_handler(
    State(state): State<GatewayState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket, params.encoding))
}

async fn handle_socket(state: GatewayState, socket: WebSocket, encoding: Encoding) {
    let session_id = Connection::generate_session_id();
    let (tx, rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER_SIZE);
    let connection = Connection::new(session_id.clone(), tx);

    tracing::info!(session_id = %session_id, ?encoding, "WebSocket connection established");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let heartbeat_ms = state.config().gateway.heartbeat_interval_ms;
    let hello = GatewayMessage::hello(HelloPayload::with_interval(heartbeat_ms));
    if let Err(e) = send_control(&mut ws_sink, &hello).await {
        tracing::warn!(session_id = %session_id, error = %e, "Failed to send HELLO");
        return;
    }

    let mut writer = tokio::spawn(write_frames(ws_sink, rx, encoding, session_id.clone()));
    let mut writer_done = false;

    // Dropped on every exit path below, including panics
    let mut session: Option<SessionGuard> = None;

    let heartbeat_timeout = Duration::from_millis(heartbeat_ms.saturating_mul(2));
    let mut check_interval = interval(Duration::from_millis((heartbeat_ms / 2).max(1)));

    let close_code = loop {
        tokio::select! {
            frame = ws_stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = handle_text(&state, &connection, &mut session, &text).await {
                        tracing::debug!(session_id = %session_id, error = %e, "Closing connection");
                        break Some(e.to_close_code());
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    tracing::debug!(session_id = %session_id, "Binary control frames not supported");
                    break Some(CloseCode::DecodeError);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(session_id = %session_id, "Client closed connection");
                    break None;
                }
                Some(Err(e)) => {
                    tracing::warn!(session_id = %session_id, error = %e, "WebSocket error");
                    break None;
                }
            },
            _ = check_interval.tick() => {
                let since = connection.time_since_heartbeat();
                if since > heartbeat_timeout {
                    tracing::warn!(
                        session_id = %session_id,
                        since_ms = since.as_millis(),
                        "Connection timed out (no heartbeat)"
                    );
                    break Some(CloseCode::SessionTimeout);
                }
            }
            _ = &mut writer => {
                writer_done = true;
                break None;
            }
        }
    };

    drop(session);
    connection.set_state(ConnectionState::Disconnected);

    if !writer_done {
        match close_code {
            Some(code) => {
                connection.close(code);
                if timeout(CLOSE_FLUSH_TIMEOUT, &mut writer).await.is_err() {
                    writer.abort();
                }
            }
            None => writer.abort(),
        }
    }

    tracing::info!(
        session_id = %session_id,
        close_code = ?close_code,
        age_ms = connection.age().as_millis(),
        "Connection closed"
    );
}

async fn handle_text(
    state: &GatewayState,
    connection: &Arc<Connection>,
    session: &mut Option<SessionGuard>,
    text: &str,
) -> Result<(), HandlerError> {
    let message = GatewayMessage::from_json(text)
        .map_err(|e| HandlerError::InvalidPayload(e.to_string()))?;

    tracing::trace!(session_id = %connection.session_id(), op = %message.op, "Received frame");

    MessageDispatcher::dispatch(state, connection, session, message).await
}

async fn send_control(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &GatewayMessage,
) -> Result<(), axum::Error> {
    let json = message.to_json().map_err(axum::Error::new)?;
    sink.send(Message::Text(json)).await
}

/// Drain the outbound queue into the socket until a close is requested,
/// the queue closes, or the socket fails
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    encoding: Encoding,
    session_id: String,
) {
    while let Some(frame) = rx.recv().await {
        let result = match frame {
            Outbound::Control(message) => send_control(&mut sink, &message).await,
            Outbound::Push(packet) => {
                let message = match encoding {
                    Encoding::Protobuf => Message::Binary(packet.to_bytes().into()),
                    Encoding::Json => match packet.to_json() {
                        Ok(json) => Message::Text(json),
                        Err(e) => {
                            tracing::warn!(session_id = %session_id, error = %e, "Failed to encode push");
                            continue;
                        }
                    },
                };
                sink.send(message).await
            }
            Outbound::Close(code) => {
                let (code, reason) = GatewayMessage::close_frame(code);
                let frame = CloseFrame {
                    code,
                    reason: reason.into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    tracing::debug!(session_id = %session_id, error = %e, "Failed to send close frame");
                }
                break;
            }
        };

        if let Err(e) = result {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to write to WebSocket");
            break;
        }
    }

    let _ = sink.close().await;
}
