//! Error types shared across the sales workspace

use thiserror::Error;
use uuid::Uuid;

use crate::types::ImportStatus;

/// Result type alias for shared sales operations
pub type Result<T> = std::result::Result<T, SalesError>;

/// Main error type for shared sales operations
#[derive(Error, Debug)]
pub enum SalesError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: ImportStatus, to: ImportStatus },

    #[error("Import job {0} is already finalized")]
    JobFinalized(Uuid),

    #[error("Unknown import status: {0}")]
    UnknownStatus(String),

    #[error("Unknown game type code: {0}")]
    UnknownGameType(i32),

    #[error("Parse error: {0}")]
    Parse(String),
}
