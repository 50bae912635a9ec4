//! Scan lifecycle orchestration.
//!
//! One orchestrator instance listens for `scan.created` events and runs
//! each scan end to end: subdomain enumeration, then port scanning over
//! the discovered hosts. Every scan runs in its own task with its own
//! error boundary, so a failing scan never takes down a neighbor or the
//! listener itself.
//!
//! Progress is a single 0..=100 number spanning both phases: enumeration
//! output is rescaled into 0..=50 and port scanning fills 50..=100. Each
//! state change is persisted before the matching event is published, so
//! the store never lags behind what subscribers have seen.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use vigil_core::{Result, ScanStore};
use vigil_model::{ScanEventPayload, ScanId, SubdomainResult};

use crate::infra::bus::ScanEventBus;
use crate::scanner::{ScannerAdapter, SubdomainEnumEvent};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Upper bound on subdomains handed to the port scanner per scan.
    pub max_port_scan_targets: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_port_scan_targets: 3,
        }
    }
}

pub struct ScanOrchestrator {
    store: Arc<dyn ScanStore>,
    bus: Arc<ScanEventBus>,
    scanner: Arc<ScannerAdapter>,
    settings: OrchestratorSettings,
}

impl std::fmt::Debug for ScanOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn ScanStore>,
        bus: Arc<ScanEventBus>,
        scanner: Arc<ScannerAdapter>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            bus,
            scanner,
            settings,
        }
    }

    /// Subscribe to `scan.created` events and launch a scan task per
    /// event. Must be called before the bus starts receiving.
    pub fn start(self: &Arc<Self>) {
        let orchestrator = Arc::clone(self);
        self.bus.on_event(move |event| {
            if let ScanEventPayload::Created { target } = event.payload {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    orchestrator.run_scan(event.scan_id, target).await;
                });
            }
            Ok(())
        });
    }

    /// Error boundary around one scan run.
    async fn run_scan(&self, scan_id: ScanId, target: String) {
        info!(%scan_id, %target, "starting scan");
        match self.execute(scan_id, &target).await {
            Ok(()) => info!(%scan_id, "scan completed"),
            Err(err) => {
                error!(%scan_id, error = %err, "scan failed");
                let message = err.to_string();
                if let Err(store_err) =
                    self.store.fail(scan_id, &message).await
                {
                    error!(
                        %scan_id,
                        error = %store_err,
                        "failed to record scan failure"
                    );
                }
                self.bus.scan_failed(scan_id, &message).await;
            }
        }
    }

    async fn execute(&self, scan_id: ScanId, target: &str) -> Result<()> {
        self.store.mark_running(scan_id).await?;
        self.bus.scan_started(scan_id).await;

        let subdomains = self.enumerate_subdomains(scan_id, target).await?;

        self.store.update_progress(scan_id, 50).await?;
        self.bus.scan_progress(scan_id, 50).await;

        self.scan_ports(scan_id, &subdomains).await?;

        let scan = self.store.complete(scan_id).await?;
        self.bus.scan_completed(&scan).await;
        Ok(())
    }

    /// Phase 1: stream subdomain discoveries into the store and onto the
    /// bus as they arrive, mapping phase progress into the 0..=50 band.
    ///
    /// An empty enumeration still yields one entry for the target itself,
    /// so the port phase always has something to probe.
    async fn enumerate_subdomains(
        &self,
        scan_id: ScanId,
        target: &str,
    ) -> Result<Vec<SubdomainResult>> {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let scanner = Arc::clone(&self.scanner);
        let owned_target = target.to_string();
        let enumeration = tokio::spawn(async move {
            scanner
                .run_subdomain_enum(scan_id, &owned_target, tx)
                .await
        });

        while let Some(event) = rx.recv().await {
            match event {
                SubdomainEnumEvent::Found(result) => {
                    self.store
                        .add_subdomain(scan_id, result.clone())
                        .await?;
                    self.bus.subdomain_found(scan_id, result).await;
                }
                SubdomainEnumEvent::Progress(percent) => {
                    let overall =
                        (f64::from(percent) * 0.5).floor() as u8;
                    self.store.update_progress(scan_id, overall).await?;
                    self.bus.scan_progress(scan_id, overall).await;
                }
            }
        }

        let mut subdomains = enumeration.await.map_err(|err| {
            vigil_core::VigilError::Internal(format!(
                "subdomain enumeration task panicked: {err}"
            ))
        })??;

        if subdomains.is_empty() {
            warn!(%scan_id, %target, "no subdomains found, scanning target directly");
            let fallback = SubdomainResult {
                subdomain: target.to_string(),
                ip: Vec::new(),
                discovered_at: chrono::Utc::now().to_rfc3339(),
            };
            self.store
                .add_subdomain(scan_id, fallback.clone())
                .await?;
            subdomains.push(fallback);
        }
        Ok(subdomains)
    }

    /// Phase 2: port-scan up to `max_port_scan_targets` subdomains,
    /// filling the 50..=100 progress band. Progress is measured against
    /// everything discovered in phase 1, so a capped run tops out below
    /// 100 until completion pins it.
    async fn scan_ports(
        &self,
        scan_id: ScanId,
        subdomains: &[SubdomainResult],
    ) -> Result<()> {
        let total = subdomains.len();
        let mut completed = 0usize;

        for entry in
            subdomains.iter().take(self.settings.max_port_scan_targets)
        {
            self.bus.ports_scanning(scan_id, &entry.subdomain).await;

            let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
            let scanner = Arc::clone(&self.scanner);
            let subdomain = entry.subdomain.clone();
            let probe = tokio::spawn(async move {
                scanner.run_port_scan(scan_id, &subdomain, tx).await;
            });

            while let Some(port) = rx.recv().await {
                self.store.add_port(scan_id, port.clone()).await?;
                self.bus.port_found(scan_id, port).await;
            }
            if let Err(err) = probe.await {
                warn!(%scan_id, error = %err, "port scan task panicked");
            }

            completed += 1;
            let overall = (50.0
                + completed as f64 / total as f64 * 50.0)
                .floor() as u8;
            self.store.update_progress(scan_id, overall).await?;
            self.bus.scan_progress(scan_id, overall).await;
        }
        Ok(())
    }
}
