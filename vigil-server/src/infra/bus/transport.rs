//! Pub/sub transport seam.
//!
//! The bus and the gateways only ever see [`EventTransport`]; production
//! runs on Redis, tests and single-process mode run on an in-process
//! broadcast fabric.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use vigil_core::{Result, VigilError};

const SUBSCRIPTION_BUFFER: usize = 256;

#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Fire a payload at a channel. Fails only on transport errors.
    async fn publish(&self, channel: &str, payload: String) -> Result<()>;

    /// Open a dedicated subscription to `channel`.
    ///
    /// Each call is an independent upstream subscription with its own
    /// receiver; dropping the receiver releases it.
    async fn subscribe(&self, channel: &str)
    -> Result<mpsc::Receiver<String>>;
}

/// Redis-backed transport.
///
/// Publishes go through a shared multiplexed connection; every
/// subscription gets its own pub/sub connection, mirroring how each
/// gateway subscription duplicates the client upstream.
pub struct RedisTransport {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl std::fmt::Debug for RedisTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTransport").finish_non_exhaustive()
    }
}

impl RedisTransport {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| VigilError::Transport(e.to_string()))?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| VigilError::Transport(e.to_string()))?;
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl EventTransport for RedisTransport {
    async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        let mut conn = self.publisher.clone();
        let _: () = conn
            .publish(channel, payload)
            .await
            .map_err(|e| VigilError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::Receiver<String>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| VigilError::Transport(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| VigilError::Transport(e.to_string()))?;

        let channel = channel.to_string();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(%channel, error = %err, "dropping undecodable pub/sub payload");
                        continue;
                    }
                };
                if tx.send(payload).await.is_err() {
                    // Receiver gone; dropping the pubsub connection
                    // unsubscribes upstream.
                    break;
                }
            }
            debug!(%channel, "pub/sub subscription closed");
        });
        Ok(rx)
    }
}

/// In-process transport over per-channel broadcast fans.
///
/// Used by tests and by degraded single-process mode when Redis is not
/// configured; semantics match Redis pub/sub (at-most-once, subscribers
/// only see what is published while they listen).
#[derive(Debug, Default)]
pub struct LocalTransport {
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(SUBSCRIPTION_BUFFER).0)
            .clone()
    }
}

#[async_trait]
impl EventTransport for LocalTransport {
    async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        // No receivers is not an error; pub/sub is fire-and-forget.
        let _ = self.sender(channel).send(payload);
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::Receiver<String>> {
        let mut upstream = self.sender(channel).subscribe();
        let channel = channel.to_string();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            loop {
                match upstream.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%channel, skipped, "local transport receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }
}
