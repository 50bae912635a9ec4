use thiserror::Error;
use vigil_model::{ScanId, ScanStatus};

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{phase} scanner failed: {message}")]
    Scanner {
        phase: &'static str,
        message: String,
    },

    #[error("Scan not found: {0}")]
    NotFound(ScanId),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: ScanStatus, to: ScanStatus },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, VigilError>;
