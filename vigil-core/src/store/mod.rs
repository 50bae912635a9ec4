//! Scan persistence seam.
//!
//! The store is the system of record for scan state. The orchestrator is
//! the only writer during a run; the API layer and the gateways read it at
//! any time. Append operations only ever grow the result lists.

mod memory;
mod postgres;

pub use memory::MemoryScanStore;
pub use postgres::PostgresScanStore;

use async_trait::async_trait;
use vigil_model::{PortResult, Scan, ScanId, SubdomainResult};

use crate::error::Result;

#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Insert a freshly created PENDING scan.
    async fn create(&self, scan: Scan) -> Result<Scan>;

    async fn get(&self, id: ScanId) -> Result<Option<Scan>>;

    /// All scans, newest first.
    async fn list(&self) -> Result<Vec<Scan>>;

    /// PENDING -> RUNNING: resets progress to 0 and stamps `started_at`.
    ///
    /// Fails with `InvalidTransition` from any other state, which doubles
    /// as the guard against a redelivered `scan.created` double-starting a
    /// run.
    async fn mark_running(&self, id: ScanId) -> Result<()>;

    /// Raise progress to `progress` (0..=100). Never lowers it.
    async fn update_progress(&self, id: ScanId, progress: u8) -> Result<()>;

    async fn add_subdomain(
        &self,
        id: ScanId,
        result: SubdomainResult,
    ) -> Result<()>;

    async fn add_port(&self, id: ScanId, result: PortResult) -> Result<()>;

    /// RUNNING -> COMPLETED: pins progress to 100, stamps `completed_at`,
    /// and returns the final snapshot for the `scan.completed` event.
    async fn complete(&self, id: ScanId) -> Result<Scan>;

    /// Terminal failure: records the error message and stamps
    /// `completed_at`. Legal from PENDING or RUNNING, never from a
    /// terminal state.
    async fn fail(&self, id: ScanId, error: &str) -> Result<()>;
}
