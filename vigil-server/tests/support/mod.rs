//! Shared harness for end-to-end orchestrator tests.
//!
//! Scans run against stub scanners: small /bin/sh scripts that print the
//! newline-delimited JSON protocol. Everything stays in-process on the
//! local transport and the in-memory store.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use vigil_core::MemoryScanStore;
use vigil_model::{Scan, ScanEvent, ScanEventPayload, ScanId, ScanType};
use vigil_server::infra::bus::{LocalTransport, ScanEventBus};
use vigil_server::infra::orchestration::{
    OrchestratorSettings, ScanOrchestrator,
};
use vigil_server::scanner::{ScannerAdapter, ScannerCommand};

pub struct Harness {
    pub store: Arc<MemoryScanStore>,
    pub bus: Arc<ScanEventBus>,
    pub events: Arc<Mutex<Vec<ScanEvent>>>,
    _scripts: TempDir,
}

impl Harness {
    /// Build and start a full pipeline with the given scanner scripts.
    /// The script receives the scan target as `$1`.
    pub async fn start(
        subdomain_script: &str,
        port_script: &str,
        max_port_scan_targets: usize,
    ) -> Self {
        let scripts = TempDir::new().unwrap();
        let scanner = Arc::new(ScannerAdapter::new(
            write_script(&scripts, "subdomain.sh", subdomain_script),
            write_script(&scripts, "ports.sh", port_script),
        ));

        let store = Arc::new(MemoryScanStore::new());
        let bus =
            Arc::new(ScanEventBus::new(Arc::new(LocalTransport::new())));

        let events: Arc<Mutex<Vec<ScanEvent>>> =
            Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&events);
        bus.on_event(move |event| {
            recorder.lock().unwrap().push(event);
            Ok(())
        });

        let orchestrator = Arc::new(ScanOrchestrator::new(
            Arc::clone(&store) as Arc<_>,
            Arc::clone(&bus),
            scanner,
            OrchestratorSettings {
                max_port_scan_targets,
            },
        ));
        orchestrator.start();
        bus.start().await.unwrap();

        Self {
            store,
            bus,
            events,
            _scripts: scripts,
        }
    }

    /// Create a scan and kick it off the way the API layer does.
    pub async fn submit(&self, target: &str) -> ScanId {
        let scan = vigil_core::ScanStore::create(
            self.store.as_ref(),
            Scan::new("test scan", target, ScanType::Quick),
        )
        .await
        .unwrap();
        self.bus.scan_created(scan.id, &scan.target).await;
        scan.id
    }

    /// Wait for the scan's terminal event, then return the stored scan.
    pub async fn wait_terminal(&self, scan_id: ScanId) -> Scan {
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(10);
        loop {
            let done = self.events.lock().unwrap().iter().any(|event| {
                event.scan_id == scan_id
                    && matches!(
                        event.payload,
                        ScanEventPayload::Completed { .. }
                            | ScanEventPayload::Failed { .. }
                    )
            });
            if done {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "scan {scan_id} did not reach a terminal state"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        // Let trailing store writes settle.
        tokio::time::sleep(Duration::from_millis(50)).await;
        vigil_core::ScanStore::get(self.store.as_ref(), scan_id)
            .await
            .unwrap()
            .unwrap()
    }

    pub fn events_for(&self, scan_id: ScanId) -> Vec<ScanEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.scan_id == scan_id)
            .cloned()
            .collect()
    }
}

fn write_script(dir: &TempDir, name: &str, body: &str) -> ScannerCommand {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(file, "{body}").unwrap();
    ScannerCommand::new("/bin/sh", [path.to_string_lossy().into_owned()])
}
