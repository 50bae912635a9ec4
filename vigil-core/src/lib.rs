//! Domain errors and scan persistence for Vigil.
//!
//! The server crate depends on this seam rather than on a concrete
//! database: the orchestrator only ever sees [`store::ScanStore`].

pub mod error;
pub mod store;

pub use error::{Result, VigilError};
pub use store::{MemoryScanStore, PostgresScanStore, ScanStore};
