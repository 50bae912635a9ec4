use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ScanId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanType {
    Quick,
    Full,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    /// Whether a scan may move from `self` to `next`.
    ///
    /// The only legal path is PENDING -> RUNNING -> {COMPLETED, FAILED}.
    /// Terminal states accept nothing.
    pub fn can_transition_to(self, next: ScanStatus) -> bool {
        use ScanStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Running, Completed) | (Running, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScanStatus::Pending => "PENDING",
            ScanStatus::Running => "RUNNING",
            ScanStatus::Completed => "COMPLETED",
            ScanStatus::Failed => "FAILED",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ScanStatus::Pending),
            "RUNNING" => Ok(ScanStatus::Running),
            "COMPLETED" => Ok(ScanStatus::Completed),
            "FAILED" => Ok(ScanStatus::Failed),
            other => Err(format!("unknown scan status: {other}")),
        }
    }
}

impl std::fmt::Display for ScanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScanType::Quick => "QUICK",
            ScanType::Full => "FULL",
            ScanType::Custom => "CUSTOM",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ScanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUICK" => Ok(ScanType::Quick),
            "FULL" => Ok(ScanType::Full),
            "CUSTOM" => Ok(ScanType::Custom),
            other => Err(format!("unknown scan type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

/// One subdomain discovered during phase 1, append-only per scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainResult {
    pub subdomain: String,
    pub ip: Vec<String>,
    pub discovered_at: String,
}

/// One port observation from phase 2, append-only per scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortResult {
    pub subdomain: String,
    pub port: u16,
    pub service: String,
    pub state: PortState,
    pub discovered_at: String,
}

/// A reconnaissance job with its lifecycle state and accumulated results.
///
/// Mutated exclusively by the orchestrator while running; readable by any
/// consumer at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub id: ScanId,
    pub name: String,
    pub target: String,
    #[serde(rename = "type")]
    pub scan_type: ScanType,
    pub status: ScanStatus,
    pub progress: u8,
    pub subdomains: Vec<SubdomainResult>,
    pub open_ports: Vec<PortResult>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scan {
    /// A fresh PENDING scan as the API layer creates it.
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        scan_type: ScanType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ScanId::new(),
            name: name.into(),
            target: target.into(),
            scan_type,
            status: ScanStatus::Pending,
            progress: 0,
            subdomains: Vec::new(),
            open_ports: Vec::new(),
            error: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
