//! Notification publishing to client-requested channels.
//!
//! Unlike scan events, notification publishes propagate their errors:
//! the caller decides whether losing a notification matters.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use vigil_model::NOTIFICATIONS_CHANNEL_PREFIX;

use vigil_core::Result;

use crate::infra::bus::EventTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
            user_id: None,
            metadata: None,
        }
    }
}

#[derive(Clone)]
pub struct NotificationPublisher {
    transport: Arc<dyn EventTransport>,
}

impl std::fmt::Debug for NotificationPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationPublisher").finish_non_exhaustive()
    }
}

impl NotificationPublisher {
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self { transport }
    }

    /// Notify every client subscribed to the global feed.
    pub async fn publish_global(
        &self,
        notification: Notification,
    ) -> Result<()> {
        self.publish_to_channel("global", notification).await
    }

    /// Notify one user's channel.
    pub async fn publish_user(
        &self,
        user_id: &str,
        mut notification: Notification,
    ) -> Result<()> {
        notification.user_id = Some(user_id.to_string());
        self.publish_to_channel(&format!("user:{user_id}"), notification)
            .await
    }

    pub async fn publish_to_channel(
        &self,
        channel: &str,
        notification: Notification,
    ) -> Result<()> {
        let payload = serde_json::to_string(&notification)?;
        self.transport
            .publish(
                &format!("{NOTIFICATIONS_CHANNEL_PREFIX}:{channel}"),
                payload,
            )
            .await?;
        info!(%channel, title = %notification.title, "published notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::bus::LocalTransport;

    #[tokio::test]
    async fn global_notifications_land_on_the_global_channel() {
        let transport = Arc::new(LocalTransport::new());
        let mut rx =
            transport.subscribe("notifications:global").await.unwrap();
        let publisher =
            NotificationPublisher::new(Arc::clone(&transport) as Arc<_>);

        publisher
            .publish_global(Notification::new(
                NotificationKind::Info,
                "Scan finished",
                "example.com is done",
            ))
            .await
            .unwrap();

        let payload = rx.recv().await.unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "info");
        assert_eq!(value["title"], "Scan finished");
    }

    #[tokio::test]
    async fn user_notifications_carry_the_user_id() {
        let transport = Arc::new(LocalTransport::new());
        let mut rx = transport
            .subscribe("notifications:user:alice")
            .await
            .unwrap();
        let publisher =
            NotificationPublisher::new(Arc::clone(&transport) as Arc<_>);

        publisher
            .publish_user(
                "alice",
                Notification::new(
                    NotificationKind::Warning,
                    "Ports open",
                    "3 new open ports",
                ),
            )
            .await
            .unwrap();

        let payload = rx.recv().await.unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&payload).unwrap();
        assert_eq!(value["userId"], "alice");
    }
}
