//! Notifications gateway: point-to-point channel relays.
//!
//! Each subscription opens a dedicated upstream transport subscription
//! scoped to that channel and relays its messages to exactly one client.
//! Relay tasks are tracked per connection, keyed by channel name, so a
//! resubscribe replaces the old relay and a disconnect aborts them all.

use std::collections::HashMap;
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
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vigil_core::Result;
use vigil_model::NOTIFICATIONS_CHANNEL_PREFIX;

use crate::infra::app_state::AppState;
use crate::infra::bus::EventTransport;
use crate::websocket::{
    Connection, NotificationClientMessage, ServerFrame,
};

const OUTBOX_CAPACITY: usize = 100;

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
    debug!(%conn_id, "notifications client connected");

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

    // Relay tasks for this client, keyed by channel name.
    let mut relays: HashMap<String, JoinHandle<()>> = HashMap::new();

    // Every client starts on the global feed.
    subscribe_channel(
        &state,
        &connection,
        &mut relays,
        "global".to_string(),
    )
    .await;

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<NotificationClientMessage>(
                    text.as_str(),
                ) {
                    Ok(NotificationClientMessage::Subscribe {
                        channel,
                    }) => {
                        subscribe_channel(
                            &state,
                            &connection,
                            &mut relays,
                            channel,
                        )
                        .await;
                    }
                    Ok(NotificationClientMessage::SubscribeUser {
                        user_id,
                    }) => {
                        subscribe_channel(
                            &state,
                            &connection,
                            &mut relays,
                            format!("user:{user_id}"),
                        )
                        .await;
                    }
                    Ok(NotificationClientMessage::Unsubscribe {
                        channel,
                    }) => {
                        if let Some(handle) = relays.remove(&channel) {
                            handle.abort();
                        }
                        let ack = ServerFrame::new(
                            "unsubscribed",
                            json!({ "channel": channel }),
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

    // Force-close whatever the client left open.
    for (_, handle) in relays.drain() {
        handle.abort();
    }
    state.websocket_manager.remove_connection(conn_id);
    debug!(%conn_id, "notifications client disconnected");
}

async fn subscribe_channel(
    state: &AppState,
    connection: &Arc<Connection>,
    relays: &mut HashMap<String, JoinHandle<()>>,
    channel: String,
) {
    // Resubscribing replaces the previous relay for the channel.
    if let Some(previous) = relays.remove(&channel) {
        previous.abort();
    }

    match spawn_notification_relay(
        Arc::clone(&state.transport),
        &channel,
        Arc::clone(connection),
    )
    .await
    {
        Ok(handle) => {
            relays.insert(channel.clone(), handle);
            let ack = ServerFrame::new(
                "subscribed",
                json!({ "channel": channel, "success": true }),
            );
            let _ = connection.send(ack).await;
        }
        Err(err) => {
            warn!(
                conn_id = %connection.id,
                %channel,
                error = %err,
                "failed to open notification subscription"
            );
            let nack = ServerFrame::new(
                "subscribed",
                json!({ "channel": channel, "success": false }),
            );
            let _ = connection.send(nack).await;
        }
    }
}

/// Open an upstream subscription for `channel` and relay every message
/// to `connection` as a `notification` frame until aborted.
pub async fn spawn_notification_relay(
    transport: Arc<dyn EventTransport>,
    channel: &str,
    connection: Arc<Connection>,
) -> Result<JoinHandle<()>> {
    let mut rx = transport
        .subscribe(&format!("{NOTIFICATIONS_CHANNEL_PREFIX}:{channel}"))
        .await?;

    Ok(tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let data: Value = match serde_json::from_str(&payload) {
                Ok(value) => value,
                Err(err) => {
                    warn!(error = %err, "unparseable notification payload");
                    continue;
                }
            };
            if connection
                .send(ServerFrame::new("notification", data))
                .await
                .is_err()
            {
                break;
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::bus::{
        LocalTransport, Notification, NotificationKind,
        NotificationPublisher,
    };

    fn connected() -> (Arc<Connection>, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(16);
        (Arc::new(Connection::new(tx)), rx)
    }

    #[tokio::test]
    async fn relay_forwards_channel_messages() {
        let transport = Arc::new(LocalTransport::new());
        let (conn, mut rx) = connected();

        let relay = spawn_notification_relay(
            Arc::clone(&transport) as Arc<_>,
            "global",
            Arc::clone(&conn),
        )
        .await
        .unwrap();

        let publisher =
            NotificationPublisher::new(Arc::clone(&transport) as Arc<_>);
        publisher
            .publish_global(Notification::new(
                NotificationKind::Info,
                "hello",
                "world",
            ))
            .await
            .unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.event, "notification");
        assert_eq!(frame.data["title"], "hello");

        relay.abort();
    }

    #[tokio::test]
    async fn aborted_relay_stops_forwarding() {
        let transport = Arc::new(LocalTransport::new());
        let (conn, mut rx) = connected();

        let relay = spawn_notification_relay(
            Arc::clone(&transport) as Arc<_>,
            "user:bob",
            Arc::clone(&conn),
        )
        .await
        .unwrap();
        relay.abort();
        let _ = relay.await;

        let publisher =
            NotificationPublisher::new(Arc::clone(&transport) as Arc<_>);
        publisher
            .publish_user(
                "bob",
                Notification::new(
                    NotificationKind::Info,
                    "late",
                    "too late",
                ),
            )
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
    }
}
