//! Device WebSocket endpoint
//!
//! Devices dial in with their credentials in the query string; the check
//! happens once here, and the resulting identity is cached on the handle
//! for the life of the connection.

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use super::ApiState;
use crate::protocol::WireMessage;
use crate::devices::{DeviceHandle, DeviceKey};

/// Credentials presented on the connection URL
#[derive(Debug, Deserialize)]
struct SocketQuery {
    #[serde(default)]
    id: String,
    #[serde(default)]
    token: String,
}

/// Build the device socket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(state)
}

/// Handle WebSocket upgrade for device connections
async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<SocketQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_device_socket(socket, state, query, addr))
}

/// Drive one device connection from handshake to cleanup
async fn handle_device_socket(
    socket: WebSocket,
    state: Arc<ApiState>,
    query: SocketQuery,
    addr: SocketAddr,
) {
    let (mut sender, mut receiver) = socket.split();

    let Some(slot) = state.credentials.authenticate_device(&query.id, &query.token) else {
        tracing::warn!(id = %query.id, ip = %addr.ip(), "device connection denied");
        let denied = WireMessage::Error("Permission Denied".to_string());
        if let Ok(json) = serde_json::to_string(&denied) {
            let _ = sender.send(Message::Text(json.into())).await;
        }
        return;
    };

    let key = DeviceKey::new(query.id, slot);
    let (handle, mut outbound) = DeviceHandle::new(key.clone(), Some(addr.ip()));
    let conn_id = handle.conn_id;

    {
        let mut registry = state.registry.lock().await;
        if let Some(old) = registry.register(handle) {
            tracing::info!(
                owner = %key.owner,
                slot = %key.slot,
                replaced = %old.conn_id,
                "new connection replaces an existing one"
            );
        }
    }
    tracing::info!(owner = %key.owner, slot = %key.slot, ip = %addr.ip(), %conn_id, "device connected");

    // Writer: drain the handle's outbound queue onto the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            match serde_json::to_string(&message) {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to serialize outbound message"),
            }
        }
    });

    // Reader: replies feed the correlator, everything else is logged
    let recv_state = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    if handle_inbound(&recv_state, conn_id, &text).await.is_break() {
                        break;
                    }
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => break,
                Message::Binary(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // A close event only knows its own connection; the conditional remove
    // keeps a stale close from evicting a replacement connection
    let removed = state.registry.lock().await.unregister(&key, conn_id);
    state.correlator.abort(conn_id).await;
    tracing::info!(owner = %key.owner, slot = %key.slot, %conn_id, removed, "device disconnected");
}

/// Dispatch one inbound text frame; `Break` closes the connection
async fn handle_inbound(state: &Arc<ApiState>, conn_id: Uuid, text: &str) -> ControlFlow<()> {
    let message: WireMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(%conn_id, error = %e, "unknown message shape, ignoring");
            return ControlFlow::Continue(());
        }
    };

    match message {
        WireMessage::Reply(reply) => {
            if !state.correlator.complete(conn_id, reply).await {
                tracing::warn!(%conn_id, "unsolicited or late reply, dropping");
            }
            ControlFlow::Continue(())
        }
        WireMessage::Error(reason) => {
            tracing::error!(%conn_id, %reason, "device reported an error, closing");
            ControlFlow::Break(())
        }
        WireMessage::Command(_) | WireMessage::Query(_) => {
            tracing::warn!(%conn_id, "device sent a request in the wrong direction, ignoring");
            ControlFlow::Continue(())
        }
    }
}
