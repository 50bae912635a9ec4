//! Execution-log gateway: per-execution log streaming.
//!
//! A client subscribes with an execution id and receives that execution's
//! log messages until a terminal `COMPLETE` or `ERROR` message arrives;
//! the relay then drains for a short grace window and closes itself, so
//! finished executions never leak upstream subscriptions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

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
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use vigil_core::Result;
use vigil_model::{EXECUTION_LOGS_CHANNEL_PREFIX, ExecutionId};

use crate::infra::app_state::AppState;
use crate::infra::bus::EventTransport;
use crate::websocket::{Connection, ExecutionClientMessage, ServerFrame};

const OUTBOX_CAPACITY: usize = 100;

/// Drain window after a terminal log message before the relay closes.
const TERMINAL_GRACE: Duration = Duration::from_secs(1);

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
    debug!(%conn_id, "execution-log client connected");

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

    let mut relays: HashMap<ExecutionId, JoinHandle<()>> = HashMap::new();

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ExecutionClientMessage>(
                    text.as_str(),
                ) {
                    Ok(ExecutionClientMessage::Subscribe {
                        execution_id,
                    }) => {
                        if let Some(previous) =
                            relays.remove(&execution_id)
                        {
                            previous.abort();
                        }
                        match spawn_execution_relay(
                            Arc::clone(&state.transport),
                            execution_id,
                            Arc::clone(&connection),
                        )
                        .await
                        {
                            Ok(handle) => {
                                relays.insert(execution_id, handle);
                                let ack = ServerFrame::new(
                                    "subscribed",
                                    json!({
                                        "executionId": execution_id,
                                        "success": true,
                                    }),
                                );
                                let _ = connection.send(ack).await;
                            }
                            Err(err) => {
                                warn!(
                                    %conn_id,
                                    %execution_id,
                                    error = %err,
                                    "failed to open execution subscription"
                                );
                                let nack = ServerFrame::new(
                                    "subscribed",
                                    json!({
                                        "executionId": execution_id,
                                        "success": false,
                                    }),
                                );
                                let _ = connection.send(nack).await;
                            }
                        }
                    }
                    Ok(ExecutionClientMessage::Unsubscribe {
                        execution_id,
                    }) => {
                        if let Some(handle) = relays.remove(&execution_id)
                        {
                            handle.abort();
                        }
                        let ack = ServerFrame::new(
                            "unsubscribed",
                            json!({ "executionId": execution_id }),
                        );
                        let _ = connection.send(ack).await;
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

    for (_, handle) in relays.drain() {
        handle.abort();
    }
    state.websocket_manager.remove_connection(conn_id);
    debug!(%conn_id, "execution-log client disconnected");
}

fn is_terminal(message: &Value) -> bool {
    matches!(
        message.get("type").and_then(Value::as_str),
        Some("COMPLETE") | Some("ERROR")
    )
}

/// Open the `execution:logs:{id}` subscription and relay messages as
/// `execution-log` frames. The relay closes on its own shortly after a
/// terminal message, or when aborted.
pub async fn spawn_execution_relay(
    transport: Arc<dyn EventTransport>,
    execution_id: ExecutionId,
    connection: Arc<Connection>,
) -> Result<JoinHandle<()>> {
    let mut rx = transport
        .subscribe(&format!(
            "{EXECUTION_LOGS_CHANNEL_PREFIX}:{execution_id}"
        ))
        .await?;

    Ok(tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let Some(message) = forward(&connection, execution_id, &payload).await
            else {
                break;
            };
            if is_terminal(&message) {
                drain_until_deadline(&connection, execution_id, &mut rx)
                    .await;
                break;
            }
        }
        debug!(%execution_id, "execution relay closed");
    }))
}

/// Relay whatever arrives during the grace window after a terminal
/// message.
async fn drain_until_deadline(
    connection: &Arc<Connection>,
    execution_id: ExecutionId,
    rx: &mut mpsc::Receiver<String>,
) {
    let deadline = Instant::now() + TERMINAL_GRACE;
    while let Ok(Some(payload)) = timeout_at(deadline, rx.recv()).await {
        if forward(connection, execution_id, &payload).await.is_none() {
            break;
        }
    }
}

/// Parse and send one log message; returns the parsed message, or `None`
/// if the client is gone or the payload was garbage worth skipping.
async fn forward(
    connection: &Arc<Connection>,
    execution_id: ExecutionId,
    payload: &str,
) -> Option<Value> {
    let mut message: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(err) => {
            warn!(%execution_id, error = %err, "unparseable execution log payload");
            return Some(Value::Null);
        }
    };
    if let Some(object) = message.as_object_mut() {
        object.insert(
            "executionId".to_string(),
            json!(execution_id),
        );
    }
    connection
        .send(ServerFrame::new("execution-log", message.clone()))
        .await
        .ok()
        .map(|_| message)
}
