//! Core data model definitions shared across Vigil crates.

pub mod events;
pub mod ids;
pub mod scan;

// Intentionally curated re-exports for downstream consumers.
pub use events::{
    EXECUTION_LOGS_CHANNEL_PREFIX, NOTIFICATIONS_CHANNEL_PREFIX,
    SCAN_EVENTS_CHANNEL, SCAN_UPDATE_EVENT, ScanEvent, ScanEventPayload,
};
pub use ids::{ExecutionId, ScanId};
pub use scan::{
    PortResult, PortState, Scan, ScanStatus, ScanType, SubdomainResult,
};
