use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use vigil_model::{
    PortResult, Scan, ScanId, ScanStatus, SubdomainResult,
};

use crate::error::{Result, VigilError};
use crate::store::ScanStore;

/// In-memory store used by tests and by single-process mode when no
/// database is configured.
#[derive(Debug, Default)]
pub struct MemoryScanStore {
    scans: DashMap<ScanId, Scan>,
}

impl MemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_scan<T>(
        &self,
        id: ScanId,
        f: impl FnOnce(&mut Scan) -> Result<T>,
    ) -> Result<T> {
        let mut entry =
            self.scans.get_mut(&id).ok_or(VigilError::NotFound(id))?;
        let scan = entry.value_mut();
        let out = f(scan)?;
        scan.updated_at = Utc::now();
        Ok(out)
    }
}

#[async_trait]
impl ScanStore for MemoryScanStore {
    async fn create(&self, scan: Scan) -> Result<Scan> {
        self.scans.insert(scan.id, scan.clone());
        Ok(scan)
    }

    async fn get(&self, id: ScanId) -> Result<Option<Scan>> {
        Ok(self.scans.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Scan>> {
        let mut scans: Vec<Scan> =
            self.scans.iter().map(|entry| entry.value().clone()).collect();
        scans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(scans)
    }

    async fn mark_running(&self, id: ScanId) -> Result<()> {
        self.with_scan(id, |scan| {
            if !scan.status.can_transition_to(ScanStatus::Running) {
                return Err(VigilError::InvalidTransition {
                    from: scan.status,
                    to: ScanStatus::Running,
                });
            }
            scan.status = ScanStatus::Running;
            scan.progress = 0;
            scan.started_at = Some(Utc::now());
            Ok(())
        })
    }

    async fn update_progress(&self, id: ScanId, progress: u8) -> Result<()> {
        self.with_scan(id, |scan| {
            scan.progress = scan.progress.max(progress.min(100));
            Ok(())
        })
    }

    async fn add_subdomain(
        &self,
        id: ScanId,
        result: SubdomainResult,
    ) -> Result<()> {
        self.with_scan(id, |scan| {
            scan.subdomains.push(result);
            Ok(())
        })
    }

    async fn add_port(&self, id: ScanId, result: PortResult) -> Result<()> {
        self.with_scan(id, |scan| {
            scan.open_ports.push(result);
            Ok(())
        })
    }

    async fn complete(&self, id: ScanId) -> Result<Scan> {
        self.with_scan(id, |scan| {
            if !scan.status.can_transition_to(ScanStatus::Completed) {
                return Err(VigilError::InvalidTransition {
                    from: scan.status,
                    to: ScanStatus::Completed,
                });
            }
            scan.status = ScanStatus::Completed;
            scan.progress = 100;
            scan.completed_at = Some(Utc::now());
            Ok(scan.clone())
        })
    }

    async fn fail(&self, id: ScanId, error: &str) -> Result<()> {
        self.with_scan(id, |scan| {
            if scan.status.is_terminal() {
                return Err(VigilError::InvalidTransition {
                    from: scan.status,
                    to: ScanStatus::Failed,
                });
            }
            scan.status = ScanStatus::Failed;
            scan.error = Some(error.to_string());
            scan.completed_at = Some(Utc::now());
            Ok(())
        })
    }
}
