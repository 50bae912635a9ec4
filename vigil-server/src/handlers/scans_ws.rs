//! Scan gateway: room-based fan-out of scan events.
//!
//! Clients join a room per scan id and receive that scan's events under
//! their public wire names; every event is additionally mirrored on the
//! global `scan:update` feed so list views can refresh without joining
//! each room.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use vigil_model::SCAN_UPDATE_EVENT;

use crate::infra::app_state::AppState;
use crate::infra::bus::ScanEventBus;
use crate::websocket::{
    Connection, ConnectionManager, ScanClientMessage, ServerFrame,
};

const OUTBOX_CAPACITY: usize = 100;

/// Register the bus handler that feeds scan rooms and the global feed.
/// Must run before the bus starts receiving.
pub fn install_scan_fanout(
    manager: Arc<ConnectionManager>,
    bus: &ScanEventBus,
) {
    bus.on_event(move |event| {
        let envelope = serde_json::to_value(&event)?;
        let data =
            envelope.get("data").cloned().unwrap_or(Value::Null);

        let room_frame = ServerFrame::new(
            event.wire_event(),
            json!({
                "scanId": event.scan_id,
                "timestamp": event.timestamp,
                "data": data,
            }),
        );
        manager.broadcast_to_room(event.scan_id, &room_frame);

        let global_frame = ServerFrame::new(
            SCAN_UPDATE_EVENT,
            json!({
                "type": event.type_name(),
                "scanId": event.scan_id,
                "timestamp": event.timestamp,
                "data": data,
            }),
        );
        manager.broadcast_all(&global_frame);
        Ok(())
    });
}

/// Handle WebSocket upgrade request
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(OUTBOX_CAPACITY);

    let connection = Arc::new(Connection::new(tx));
    let conn_id = connection.id;
    state.websocket_manager.add_connection(Arc::clone(&connection));
    debug!(%conn_id, "scan gateway client connected");

    // Outgoing frames
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Incoming messages
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ScanClientMessage>(
                    text.as_str(),
                ) {
                    Ok(message) => {
                        handle_client_message(
                            message,
                            &state,
                            &connection,
                        )
                        .await;
                    }
                    Err(err) => {
                        warn!(%conn_id, error = %err, "unparseable client message");
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Err(err) => {
                warn!(%conn_id, error = %err, "websocket error");
                break;
            }
            _ => {}
        }
    }

    state.websocket_manager.remove_connection(conn_id);
    debug!(%conn_id, "scan gateway client disconnected");
}

async fn handle_client_message(
    message: ScanClientMessage,
    state: &AppState,
    connection: &Arc<Connection>,
) {
    match message {
        ScanClientMessage::Subscribe { scan_id } => {
            state.websocket_manager.join_room(scan_id, connection.id);
            let ack = ServerFrame::new(
                "subscribed",
                json!({ "scanId": scan_id }),
            );
            if connection.send(ack).await.is_err() {
                warn!(conn_id = %connection.id, "failed to ack subscribe");
            }
        }
        ScanClientMessage::Unsubscribe { scan_id } => {
            state.websocket_manager.leave_room(scan_id, connection.id);
            let ack = ServerFrame::new(
                "unsubscribed",
                json!({ "scanId": scan_id }),
            );
            if connection.send(ack).await.is_err() {
                warn!(conn_id = %connection.id, "failed to ack unsubscribe");
            }
        }
    }
}
