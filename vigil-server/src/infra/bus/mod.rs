//! Scan event bus.
//!
//! Fire-and-forget publish/subscribe of [`ScanEvent`] values over one
//! well-known transport channel. Producers never know who consumes; a
//! degraded transport degrades fan-out, never a running scan.

pub mod notify;
pub mod transport;

pub use notify::{Notification, NotificationKind, NotificationPublisher};
pub use transport::{EventTransport, LocalTransport, RedisTransport};

use std::sync::{Arc, RwLock};

use tracing::{debug, error, warn};
use vigil_model::{
    PortResult, SCAN_EVENTS_CHANNEL, Scan, ScanEvent, ScanEventPayload,
    ScanId, SubdomainResult,
};

use vigil_core::Result;

type EventHandler =
    Box<dyn Fn(ScanEvent) -> anyhow::Result<()> + Send + Sync>;

/// Process-wide scan event bus instance.
///
/// Constructed once in the composition root and passed by `Arc`; handlers
/// are registered before [`ScanEventBus::start`] opens the single
/// upstream subscription. Events published before `start` are lost, so
/// the composition root starts the bus before any producer can publish.
pub struct ScanEventBus {
    transport: Arc<dyn EventTransport>,
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl std::fmt::Debug for ScanEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers =
            self.handlers.read().map(|guard| guard.len()).unwrap_or(0);
        f.debug_struct("ScanEventBus")
            .field("handler_count", &handlers)
            .finish_non_exhaustive()
    }
}

impl ScanEventBus {
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self {
            transport,
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a callback invoked once per received event.
    ///
    /// Invocation order across handlers is unspecified; one handler's
    /// failure never prevents the others from running.
    pub fn on_event(
        &self,
        handler: impl Fn(ScanEvent) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
    ) {
        if let Ok(mut guard) = self.handlers.write() {
            guard.push(Box::new(handler));
        }
    }

    /// Open the single upstream subscription and start demultiplexing to
    /// registered handlers.
    pub async fn start(&self) -> Result<()> {
        let mut rx = self.transport.subscribe(SCAN_EVENTS_CHANNEL).await?;
        let handlers = Arc::clone(&self.handlers);
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let event: ScanEvent = match serde_json::from_str(&payload)
                {
                    Ok(event) => event,
                    Err(err) => {
                        error!(error = %err, "failed to parse scan event");
                        continue;
                    }
                };
                debug!(
                    scan_id = %event.scan_id,
                    event_type = event.type_name(),
                    "received scan event"
                );
                let guard = match handlers.read() {
                    Ok(guard) => guard,
                    Err(_) => continue,
                };
                for handler in guard.iter() {
                    if let Err(err) = handler(event.clone()) {
                        error!(error = %err, "error in event handler");
                    }
                }
            }
        });
        Ok(())
    }

    /// Publish an event to the shared channel.
    ///
    /// Transport failures are logged and swallowed; a scan must be able
    /// to proceed even when real-time fan-out is degraded.
    pub async fn publish(&self, event: ScanEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to serialize scan event");
                return;
            }
        };
        match self
            .transport
            .publish(SCAN_EVENTS_CHANNEL, payload)
            .await
        {
            Ok(()) => debug!(
                scan_id = %event.scan_id,
                event_type = event.type_name(),
                "published scan event"
            ),
            Err(err) => warn!(
                scan_id = %event.scan_id,
                event_type = event.type_name(),
                error = %err,
                "failed to publish scan event"
            ),
        }
    }

    pub async fn scan_created(&self, scan_id: ScanId, target: &str) {
        self.publish(ScanEvent::new(
            scan_id,
            ScanEventPayload::Created {
                target: target.to_string(),
            },
        ))
        .await;
    }

    pub async fn scan_started(&self, scan_id: ScanId) {
        self.publish(ScanEvent::new(scan_id, ScanEventPayload::Started))
            .await;
    }

    pub async fn scan_progress(&self, scan_id: ScanId, progress: u8) {
        self.publish(ScanEvent::new(
            scan_id,
            ScanEventPayload::Progress { progress },
        ))
        .await;
    }

    pub async fn subdomain_found(
        &self,
        scan_id: ScanId,
        result: SubdomainResult,
    ) {
        self.publish(ScanEvent::new(
            scan_id,
            ScanEventPayload::SubdomainFound(result),
        ))
        .await;
    }

    pub async fn ports_scanning(&self, scan_id: ScanId, subdomain: &str) {
        self.publish(ScanEvent::new(
            scan_id,
            ScanEventPayload::PortsScanning {
                subdomain: subdomain.to_string(),
            },
        ))
        .await;
    }

    pub async fn port_found(&self, scan_id: ScanId, result: PortResult) {
        self.publish(ScanEvent::new(
            scan_id,
            ScanEventPayload::PortFound(result),
        ))
        .await;
    }

    /// Publish the terminal `scan.completed` event with the final
    /// results snapshot.
    pub async fn scan_completed(&self, scan: &Scan) {
        self.publish(ScanEvent::new(
            scan.id,
            ScanEventPayload::Completed {
                subdomains: scan.subdomains.clone(),
                open_ports: scan.open_ports.clone(),
            },
        ))
        .await;
    }

    pub async fn scan_failed(&self, scan_id: ScanId, error: &str) {
        self.publish(ScanEvent::new(
            scan_id,
            ScanEventPayload::Failed {
                error: error.to_string(),
            },
        ))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use vigil_core::VigilError;

    async fn settled() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn events_reach_registered_handlers() {
        let bus = ScanEventBus::new(Arc::new(LocalTransport::new()));
        let seen: Arc<Mutex<Vec<ScanEvent>>> =
            Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.on_event(move |event| {
            sink.lock().unwrap().push(event);
            Ok(())
        });
        bus.start().await.unwrap();

        let id = ScanId::new();
        bus.scan_started(id).await;
        settled().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].scan_id, id);
        assert_eq!(seen[0].type_name(), "scan.started");
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_others() {
        let bus = ScanEventBus::new(Arc::new(LocalTransport::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        bus.on_event(|_| anyhow::bail!("boom"));
        let counter = Arc::clone(&calls);
        bus.on_event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.start().await.unwrap();

        bus.scan_started(ScanId::new()).await;
        settled().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let transport = Arc::new(LocalTransport::new());
        let bus = ScanEventBus::new(Arc::clone(&transport) as Arc<_>);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        bus.on_event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.start().await.unwrap();

        transport
            .publish(SCAN_EVENTS_CHANNEL, "not json".to_string())
            .await
            .unwrap();
        bus.scan_started(ScanId::new()).await;
        settled().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct DeadTransport;

    #[async_trait]
    impl EventTransport for DeadTransport {
        async fn publish(
            &self,
            _channel: &str,
            _payload: String,
        ) -> vigil_core::Result<()> {
            Err(VigilError::Transport("connection refused".to_string()))
        }

        async fn subscribe(
            &self,
            _channel: &str,
        ) -> vigil_core::Result<mpsc::Receiver<String>> {
            Err(VigilError::Transport("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn publish_swallows_transport_failure() {
        let bus = ScanEventBus::new(Arc::new(DeadTransport));
        // Must not panic or error back into the caller.
        bus.scan_started(ScanId::new()).await;
    }

    #[tokio::test]
    async fn start_surfaces_subscribe_failure() {
        let bus = ScanEventBus::new(Arc::new(DeadTransport));
        assert!(bus.start().await.is_err());
    }
}
