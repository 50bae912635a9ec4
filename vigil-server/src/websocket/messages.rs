//! Wire messages exchanged with WebSocket clients.
//!
//! Every frame in both directions is a JSON text message. Server frames
//! share one envelope: a wire event name plus an arbitrary JSON payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vigil_model::{ExecutionId, ScanId};

/// Outbound frame: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerFrame {
    pub event: String,
    pub data: Value,
}

impl ServerFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Client messages on the scan gateway: join or leave one scan's room.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ScanClientMessage {
    Subscribe {
        #[serde(rename = "scanId")]
        scan_id: ScanId,
    },
    Unsubscribe {
        #[serde(rename = "scanId")]
        scan_id: ScanId,
    },
}

/// Client messages on the notifications gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum NotificationClientMessage {
    /// Subscribe to a named channel ("global" or any app-defined name).
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    /// Subscribe to a user's personal channel.
    SubscribeUser {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

/// Client messages on the execution-log gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ExecutionClientMessage {
    Subscribe {
        #[serde(rename = "executionId")]
        execution_id: ExecutionId,
    },
    Unsubscribe {
        #[serde(rename = "executionId")]
        execution_id: ExecutionId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scan_subscribe() {
        let id = ScanId::new();
        let raw =
            format!(r#"{{"event":"subscribe","scanId":"{id}"}}"#);
        let parsed: ScanClientMessage =
            serde_json::from_str(&raw).unwrap();
        assert!(matches!(
            parsed,
            ScanClientMessage::Subscribe { scan_id } if scan_id == id
        ));
    }

    #[test]
    fn parses_notification_messages() {
        let parsed: NotificationClientMessage = serde_json::from_str(
            r#"{"event":"subscribe","channel":"global"}"#,
        )
        .unwrap();
        assert!(matches!(
            parsed,
            NotificationClientMessage::Subscribe { ref channel } if channel == "global"
        ));

        let parsed: NotificationClientMessage = serde_json::from_str(
            r#"{"event":"subscribe-user","userId":"alice"}"#,
        )
        .unwrap();
        assert!(matches!(
            parsed,
            NotificationClientMessage::SubscribeUser { ref user_id } if user_id == "alice"
        ));
    }

    #[test]
    fn server_frame_round_trips() {
        let frame = ServerFrame::new(
            "scan:update",
            serde_json::json!({"scanId": "abc"}),
        );
        let raw = serde_json::to_string(&frame).unwrap();
        assert!(raw.contains(r#""event":"scan:update""#));
    }

    #[test]
    fn rejects_unknown_events() {
        assert!(
            serde_json::from_str::<ScanClientMessage>(
                r#"{"event":"shout","scanId":"x"}"#
            )
            .is_err()
        );
    }
}
