//! The scanner stdout protocol.
//!
//! External scanners emit newline-delimited JSON objects with a `type`
//! discriminator. Anything that does not parse is logged and skipped by
//! the adapter; a bad line is never fatal.

use serde::Deserialize;
use vigil_model::{PortResult, SubdomainResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScannerLine {
    Subdomain(SubdomainResult),
    Progress { percent: f64 },
    Port(PortResult),
}
