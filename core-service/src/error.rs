use bridge_traits::{BridgeError, Category, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("No content directory configured for {0}")]
    CategoryNotConfigured(Category),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Remote error: {0}")]
    Remote(#[from] BridgeError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Backup error: {0}")]
    Backup(#[from] core_backup::BackupError),
}

impl CoreError {
    /// Category tag for user-facing notifications.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::CapabilityMissing { .. } | CoreError::CategoryNotConfigured(_) => {
                ErrorKind::Configuration
            }
            CoreError::Runtime(e) => e.kind(),
            CoreError::Remote(e) => e.kind(),
            CoreError::Sync(e) => e.kind(),
            CoreError::Backup(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
