use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category tag attached to every user-facing failure notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Remote server unreachable or credentials rejected
    Connectivity,
    /// Non-success response or stream interruption during a fetch
    Transfer,
    /// Corrupt/unsupported archive or filesystem failure while extracting
    Extraction,
    /// A required configuration value is missing or empty
    Configuration,
    /// Restore requested while no backup archive exists
    ArchiveState,
    /// Anything else (I/O outside extraction, worker shutdown, ...)
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Transfer => "transfer",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Configuration => "configuration",
            ErrorKind::ArchiveState => "archive-state",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Cannot reach content server: {0}")]
    Connectivity(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Connectivity(_) => ErrorKind::Connectivity,
            BridgeError::Transfer(_) => ErrorKind::Transfer,
            BridgeError::NotAvailable(_) | BridgeError::OperationFailed(_) | BridgeError::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// I/O errors are rebuilt from their kind and message.
impl Clone for BridgeError {
    fn clone(&self) -> Self {
        match self {
            BridgeError::NotAvailable(m) => BridgeError::NotAvailable(m.clone()),
            BridgeError::OperationFailed(m) => BridgeError::OperationFailed(m.clone()),
            BridgeError::Connectivity(m) => BridgeError::Connectivity(m.clone()),
            BridgeError::Transfer(m) => BridgeError::Transfer(m.clone()),
            BridgeError::Io(e) => BridgeError::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
