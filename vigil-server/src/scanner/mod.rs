pub mod adapter;
pub mod wire;

pub use adapter::{ScannerAdapter, ScannerCommand, SubdomainEnumEvent};
pub use wire::ScannerLine;
