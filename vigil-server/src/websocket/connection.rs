use std::fmt;

use anyhow::Result;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::messages::ServerFrame;

/// One live WebSocket client.
///
/// The gateway handler owns the receiving half and writes frames to the
/// socket; everything else holds this sending half behind an `Arc`.
#[derive(Clone)]
pub struct Connection {
    pub id: Uuid,
    sender: mpsc::Sender<ServerFrame>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("channel_closed", &self.sender.is_closed())
            .finish()
    }
}

impl Connection {
    pub fn new(sender: mpsc::Sender<ServerFrame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
        }
    }

    /// Send a frame, waiting for outbox capacity.
    pub async fn send(&self, frame: ServerFrame) -> Result<()> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| anyhow::anyhow!("connection outbox closed"))
    }

    /// Send a frame without awaiting; drops the frame if the client's
    /// outbox is full or closed. Used from synchronous fan-out paths
    /// where a slow client must not stall delivery to the others.
    pub fn try_send(&self, frame: ServerFrame) -> Result<()> {
        self.sender
            .try_send(frame)
            .map_err(|err| anyhow::anyhow!("connection outbox: {err}"))
    }
}
