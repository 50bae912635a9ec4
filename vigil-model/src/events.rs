//! Scan event envelope and the pub/sub channel vocabulary.
//!
//! Every mutation the orchestrator makes that matters to a live observer is
//! mirrored onto the `scan:events` channel as one [`ScanEvent`]. Events are
//! immutable once published and carry no delivery guarantee: a subscriber
//! that was not listening at publish time never sees the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ScanId;
use crate::scan::{PortResult, SubdomainResult};

/// The single well-known channel carrying all scan events system-wide.
pub const SCAN_EVENTS_CHANNEL: &str = "scan:events";

/// Prefix for client-requested notification channels
/// (`notifications:global`, `notifications:user:{id}`, ...).
pub const NOTIFICATIONS_CHANNEL_PREFIX: &str = "notifications";

/// Prefix for per-execution log channels (`execution:logs:{id}`).
pub const EXECUTION_LOGS_CHANNEL_PREFIX: &str = "execution:logs";

/// Wire event emitted on the global feed for every scan event, so list
/// views can refresh without per-scan subscriptions.
pub const SCAN_UPDATE_EVENT: &str = "scan:update";

/// Typed payload, one shape per event kind.
///
/// Serializes adjacently tagged as `{"type": "...", "data": {...}}`, which
/// is exactly the envelope the channel has always carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ScanEventPayload {
    #[serde(rename = "scan.created")]
    Created { target: String },
    #[serde(rename = "scan.started")]
    Started,
    #[serde(rename = "scan.progress")]
    Progress { progress: u8 },
    #[serde(rename = "scan.subdomain.found")]
    SubdomainFound(SubdomainResult),
    #[serde(rename = "scan.ports.scanning")]
    PortsScanning { subdomain: String },
    #[serde(rename = "scan.port.found")]
    PortFound(PortResult),
    #[serde(rename = "scan.completed")]
    Completed {
        subdomains: Vec<SubdomainResult>,
        #[serde(rename = "openPorts")]
        open_ports: Vec<PortResult>,
    },
    #[serde(rename = "scan.failed")]
    Failed { error: String },
}

impl ScanEventPayload {
    /// The internal event type string, as it appears on the channel.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "scan.created",
            Self::Started => "scan.started",
            Self::Progress { .. } => "scan.progress",
            Self::SubdomainFound(_) => "scan.subdomain.found",
            Self::PortsScanning { .. } => "scan.ports.scanning",
            Self::PortFound(_) => "scan.port.found",
            Self::Completed { .. } => "scan.completed",
            Self::Failed { .. } => "scan.failed",
        }
    }

    /// The public WebSocket event name emitted to scan rooms.
    ///
    /// With a closed payload type this lookup is exhaustive; the generic
    /// `scan:event` name the gateway used to fall back to can no longer
    /// occur.
    pub fn wire_event(&self) -> &'static str {
        match self {
            Self::Created { .. } => "scan:created",
            Self::Started => "scan:started",
            Self::Progress { .. } => "scan:progress",
            Self::SubdomainFound(_) => "scan:subdomain",
            Self::PortsScanning { .. } => "scan:ports_scanning",
            Self::PortFound(_) => "scan:port",
            Self::Completed { .. } => "scan:completed",
            Self::Failed { .. } => "scan:failed",
        }
    }
}

/// The bus message envelope: `{type, scanId, timestamp, data?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    #[serde(rename = "scanId")]
    pub scan_id: ScanId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: ScanEventPayload,
}

impl ScanEvent {
    pub fn new(scan_id: ScanId, payload: ScanEventPayload) -> Self {
        Self {
            scan_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }

    pub fn wire_event(&self) -> &'static str {
        self.payload.wire_event()
    }
}
