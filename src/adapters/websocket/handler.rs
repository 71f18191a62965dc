//! WebSocket upgrade handler for live event connections.
//!
//! Handles the HTTP → WebSocket upgrade and manages the connection lifecycle:
//! 1. Reject the upgrade with 503 once the relay is shutting down
//! 2. Register a bounded outbound queue with the connection registry
//! 3. Drain the queue into the socket (one text frame per event) and ping
//!    the client periodically
//! 4. Unregister on client close, read error, or write failure

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::application::{Connection, ConnectionId, ConnectionRegistry, ConnectionSettings};
use crate::domain::RelayEvent;

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub registry: Arc<ConnectionRegistry>,
    pub settings: ConnectionSettings,
}

impl WebSocketState {
    pub fn new(registry: Arc<ConnectionRegistry>, settings: ConnectionSettings) -> Self {
        Self { registry, settings }
    }
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws`
///
/// Authentication is enforced by the gateway in front of the relay.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebSocketState>) -> Response {
    if state.registry.is_closed() {
        return (StatusCode::SERVICE_UNAVAILABLE, "service shutting down").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Runs for the lifetime of one client connection.
async fn handle_socket(mut socket: WebSocket, state: WebSocketState) {
    let (outbound_tx, outbound_rx) = mpsc::channel(state.settings.queue_capacity);

    let connection_id = match state.registry.register(Connection::new(outbound_tx)) {
        Ok(id) => id,
        Err(e) => {
            // Lost the race with shutdown between upgrade and registration.
            let _ = socket.send(close_message(close_code::AGAIN, e.to_string())).await;
            return;
        }
    };
    tracing::info!(connection_id = %connection_id, "Client connected");

    let (sender, receiver) = socket.split();

    let mut send_task = tokio::spawn(write_loop(
        sender,
        outbound_rx,
        state.settings,
        connection_id,
        state.registry.clone(),
    ));
    let mut recv_task = tokio::spawn(read_loop(receiver, connection_id));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.registry.unregister(&connection_id);
    tracing::info!(connection_id = %connection_id, "Client disconnected");
}

/// Forward queued events to the client and keep the connection alive.
///
/// Ends when the queue closes (the registry let go of this connection) or
/// when a socket write fails or exceeds the write timeout.
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<Arc<RelayEvent>>,
    settings: ConnectionSettings,
    connection_id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
) {
    let mut ping = tokio::time::interval(settings.ping_interval);
    ping.tick().await;

    loop {
        let message = tokio::select! {
            event = queue.recv() => match event {
                Some(event) => Message::Text(event.frame().to_string()),
                None => {
                    let reason = if registry.is_closed() {
                        "service shutting down"
                    } else {
                        "connection dropped by relay"
                    };
                    let _ = sender.send(close_message(close_code::AWAY, reason)).await;
                    return;
                }
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };

        if let Err(reason) = send_with_timeout(&mut sender, message, settings.write_timeout).await {
            tracing::debug!(connection_id = %connection_id, reason = %reason, "Write failed, closing connection");
            registry.unregister(&connection_id);
            return;
        }
    }
}

async fn send_with_timeout(
    sender: &mut SplitSink<WebSocket, Message>,
    message: Message,
    timeout: Duration,
) -> Result<(), String> {
    match tokio::time::timeout(timeout, sender.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("write timed out after {:?}", timeout)),
    }
}

/// Drain client frames until the client goes away.
///
/// Clients have nothing to say to the relay; protocol pings are answered
/// by axum itself.
async fn read_loop(mut receiver: SplitStream<WebSocket>, connection_id: ConnectionId) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %connection_id, "Client sent close frame");
                break;
            }
            Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {
                tracing::trace!(connection_id = %connection_id, "Ignoring client data frame");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, "Receive error: {}", e);
                break;
            }
        }
    }
}

fn close_message(code: u16, reason: impl Into<String>) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into().into(),
    }))
}

/// Create axum router for the WebSocket endpoint.
pub fn websocket_router() -> axum::Router<WebSocketState> {
    use axum::routing::get;

    axum::Router::new().route("/ws", get(ws_handler))
}
