// WebSocket endpoint: one socket per connected device.
//
// The first frame must be `hello {token}` carrying the same JWT the
// REST surface accepts; until it validates, the connection has no
// registry entry and receives nothing. After the handshake the socket
// is pumped from its registry channel, and the only client frames the
// server acts on are join-room / leave-room.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsFrame, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use roomline_common::protocol::ws::ChatEvent;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::jwt::AccessTokenService;
use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct WsState {
    token_service: Arc<AccessTokenService>,
    registry: Arc<ConnectionRegistry>,
}

pub fn router(token_service: Arc<AccessTokenService>, registry: Arc<ConnectionRegistry>) -> Router {
    Router::new()
        .route("/v1/ws", get(ws_upgrade))
        .with_state(WsState { token_service, registry })
}

async fn ws_upgrade(State(state): State<WsState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: WsState, mut socket: WebSocket) {
    let user_id = match await_hello(&mut socket).await {
        Ok(token) => match state.token_service.validate_token(&token) {
            Ok(access) => access.user_id,
            Err(_) => {
                reject(socket, "AUTH_INVALID_TOKEN", "invalid authentication token").await;
                return;
            }
        },
        Err(HandshakeError::NotHello) => {
            reject(socket, "HELLO_REQUIRED", "first frame must be a hello event").await;
            return;
        }
        Err(HandshakeError::Closed) => return,
    };

    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.registry.register(user_id, conn_id, tx).await;

    let ack = ChatEvent::HelloAck { conn_id, server_time: Utc::now().to_rfc3339() };
    if send_event(&mut socket, &ack).await.is_err() {
        state.registry.unregister(user_id, conn_id).await;
        return;
    }
    info!(user_id = %user_id, conn_id = %conn_id, "chat socket registered");

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(event) => {
                    if send_event(&mut socket, &event).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(WsFrame::Text(raw))) => {
                    handle_client_frame(&state, user_id, conn_id, raw.as_str()).await;
                }
                Some(Ok(WsFrame::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    state.registry.unregister(user_id, conn_id).await;
    info!(user_id = %user_id, conn_id = %conn_id, "chat socket closed");
}

enum HandshakeError {
    NotHello,
    Closed,
}

async fn await_hello(socket: &mut WebSocket) -> Result<String, HandshakeError> {
    match socket.recv().await {
        Some(Ok(WsFrame::Text(raw))) => match serde_json::from_str::<ChatEvent>(raw.as_str()) {
            Ok(ChatEvent::Hello { token }) => Ok(token),
            _ => Err(HandshakeError::NotHello),
        },
        Some(Ok(WsFrame::Close(_))) | None => Err(HandshakeError::Closed),
        _ => Err(HandshakeError::NotHello),
    }
}

async fn handle_client_frame(state: &WsState, user_id: Uuid, conn_id: Uuid, raw: &str) {
    match serde_json::from_str::<ChatEvent>(raw) {
        Ok(ChatEvent::JoinRoom { room_id }) => {
            state.registry.join_room(&room_id, user_id, conn_id).await;
        }
        Ok(ChatEvent::LeaveRoom { room_id }) => {
            state.registry.leave_room(&room_id, user_id, conn_id).await;
        }
        // Every other event name is server-to-client only.
        Ok(_) => {}
        Err(error) => {
            warn!(user_id = %user_id, error = %error, "unparseable client frame dropped");
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &ChatEvent) -> Result<(), axum::Error> {
    let Ok(text) = serde_json::to_string(event) else {
        return Ok(());
    };
    socket.send(WsFrame::Text(text.into())).await
}

async fn reject(mut socket: WebSocket, code: &str, message: &str) {
    let event = ChatEvent::Error {
        code: code.to_string(),
        message: message.to_string(),
        retryable: false,
    };
    let _ = send_event(&mut socket, &event).await;
    let _ = socket.send(WsFrame::Close(None)).await;
}
